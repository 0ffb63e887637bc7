//! Per-session state
//!
//! Each browser session gets its own alert state, in-memory settings and
//! voice event ledger. Nothing here is shared between sessions.

use crate::dispatcher::DispatchReport;
use crate::error::SosResult;
use crate::location::Location;
use crate::settings::Settings;
use crate::state::AlertState;
use crate::voice::EventLedger;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sessions idle for longer than this are dropped
const SESSION_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on live sessions; the least recently seen goes first
pub const MAX_SESSIONS: usize = 10_000;

/// Random 128-bit session identifier, hex encoded
pub fn new_session_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}

/// Session ids we issued look like this; anything else gets a fresh one
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Info,
    Warning,
    Error,
}

/// One-shot status message shown on the next render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub alert: AlertState,
    pub settings: Settings,
    pub ledger: EventLedger,
    pub last_report: Option<DispatchReport>,
    pub last_location: Option<Location>,
    pub flashes: Vec<Flash>,
    last_seen: Instant,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            alert: AlertState::new(),
            settings,
            ledger: EventLedger::new(),
            last_report: None,
            last_location: None,
            flashes: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn flash(&mut self, kind: FlashKind, message: impl Into<String>) {
        self.flashes.push(Flash::new(kind, message));
    }

    /// Messages to show now; they will not be shown again
    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }
}

/// All live sessions, keyed by session id
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Run `f` against the session, creating it with `init` if needed.
    ///
    /// The registry lock is held for the duration of `f`, so `f` must not
    /// block or await.
    pub fn with_session<R>(
        &self,
        id: &str,
        init: impl FnOnce() -> Settings,
        f: impl FnOnce(&mut Session) -> R,
    ) -> SosResult<R> {
        let mut sessions = self.sessions.lock()?;

        if !sessions.contains_key(id) {
            let before = sessions.len();
            sessions.retain(|_, s| s.last_seen.elapsed() < SESSION_IDLE_TTL);
            if sessions.len() != before {
                debug!("Dropped {} idle sessions", before - sessions.len());
            }

            while sessions.len() >= self.max_sessions {
                let oldest = sessions
                    .iter()
                    .min_by_key(|(_, s)| s.last_seen)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(oldest) => {
                        sessions.remove(&oldest);
                        warn!("⚠️ Session limit reached, dropped least recent session");
                    }
                    None => break,
                }
            }
        }

        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(init()));
        session.last_seen = Instant::now();
        Ok(f(session))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
