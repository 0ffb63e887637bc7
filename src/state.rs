//! Session/Alert State Machine
//!
//! All transitions go through [`reduce`], which returns the next state and
//! the effects the caller must run. The `active` / `sequence_completed`
//! flags are derived from the phase, so `sequence_completed` can never be
//! true while the alert is inactive.

use std::fmt;

/// What started the current activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSource {
    Button,
    Voice { keyword: String },
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Button => write!(f, "SOS Button"),
            TriggerSource::Voice { keyword } => write!(f, "Voice Command: '{}'", keyword),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlertPhase {
    #[default]
    Idle,
    /// Triggered, sequence not started yet
    ActivePending,
    /// Sequence in progress
    ActiveRunning,
    /// Sequence completed, ongoing-alert view
    ActiveDone,
}

/// Discrete inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    ButtonPressed,
    VoiceSignal { keyword: String },
    SequenceStarted,
    /// The sequence for the given activation has ended
    SequenceFinished { activation: u64 },
    Reset,
}

/// Work the caller must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Run the alert dispatcher, once
    RunSequence,
    /// State visible to the user changed
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlertState {
    phase: AlertPhase,
    trigger_source: Option<TriggerSource>,
    /// Bumped on every activation, kept across resets
    activation: u64,
}

/// Flat view of the alert state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertFlags {
    pub active: bool,
    pub sequence_completed: bool,
    pub trigger_source: Option<TriggerSource>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn active(&self) -> bool {
        self.phase != AlertPhase::Idle
    }

    pub fn sequence_completed(&self) -> bool {
        self.phase == AlertPhase::ActiveDone
    }

    pub fn trigger_source(&self) -> Option<&TriggerSource> {
        self.trigger_source.as_ref()
    }

    /// Id of the current (or most recent) activation
    pub fn activation(&self) -> u64 {
        self.activation
    }

    pub fn flags(&self) -> AlertFlags {
        AlertFlags {
            active: self.active(),
            sequence_completed: self.sequence_completed(),
            trigger_source: self.trigger_source.clone(),
        }
    }

    /// Apply an event in place, returning the effects to run
    pub fn apply(&mut self, event: AlertEvent) -> Vec<Effect> {
        let (next, effects) = reduce(self, event);
        *self = next;
        effects
    }
}

/// Reducer: (state, event) -> (next_state, effects)
///
/// Triggers are only honoured from `Idle`; a second trigger during an
/// activation is ignored and does not replace the recorded source.
/// `SequenceFinished` only completes the activation it was started for.
pub fn reduce(state: &AlertState, event: AlertEvent) -> (AlertState, Vec<Effect>) {
    use AlertEvent::*;
    use AlertPhase::*;

    let activate = |source: TriggerSource| {
        (
            AlertState {
                phase: ActivePending,
                trigger_source: Some(source),
                activation: state.activation.wrapping_add(1),
            },
            vec![Effect::RunSequence],
        )
    };

    match (state.phase, event) {
        (Idle, ButtonPressed) => activate(TriggerSource::Button),
        (Idle, VoiceSignal { keyword }) => activate(TriggerSource::Voice { keyword }),

        (ActivePending, SequenceStarted) => (
            AlertState {
                phase: ActiveRunning,
                ..state.clone()
            },
            vec![],
        ),
        (ActiveRunning, SequenceFinished { activation }) if activation == state.activation => (
            AlertState {
                phase: ActiveDone,
                ..state.clone()
            },
            vec![Effect::Render],
        ),

        (ActivePending | ActiveRunning | ActiveDone, Reset) => (
            AlertState {
                activation: state.activation,
                ..AlertState::default()
            },
            vec![Effect::Render],
        ),

        // Everything else leaves the state untouched
        (_, _) => (state.clone(), vec![]),
    }
}
