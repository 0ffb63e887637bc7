//! Alert Dispatcher
//!
//! Runs the emergency sequence for one activation: voice call first, then
//! SMS, with fixed pauses between steps. Each channel reports on its own.

use crate::config::Config;
use crate::error::ProviderError;
use crate::location::Location;
use crate::provider::{CommsProvider, Credentials};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pauses between the steps of the sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTiming {
    pub before_call: Duration,
    pub before_sms: Duration,
    pub before_siren: Duration,
}

impl DispatchTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            before_call: Duration::from_millis(config.call_delay_ms),
            before_sms: Duration::from_millis(config.sms_delay_ms),
            before_siren: Duration::from_millis(config.siren_delay_ms),
        }
    }
}

/// Outcome of one run of the sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub call_ok: bool,
    pub sms_ok: bool,
    pub call_error: Option<ProviderError>,
    pub sms_error: Option<ProviderError>,
    /// Progress lines in the order the steps ran
    pub steps: Vec<String>,
}

impl DispatchReport {
    fn rejected(error: ProviderError) -> Self {
        Self {
            call_ok: false,
            sms_ok: false,
            call_error: Some(error.clone()),
            sms_error: Some(error),
            steps: Vec::new(),
        }
    }
}

/// Script spoken on the emergency call
pub fn call_script(user_name: &str, location: &Location) -> String {
    format!(
        "{} needs immediate assistance. Location: {}. Coordinates: {}, {}",
        user_name, location.address, location.latitude, location.longitude
    )
}

/// Body of the emergency SMS, flattened to a single line
pub fn sms_body(user_name: &str, location: &Location) -> String {
    format!(
        "EMERGENCY SOS ALERT! {} needs immediate help. Location: {}. Google Maps: {}",
        user_name, location.address, location.map_link
    )
    .replace('\n', " ")
    .trim()
    .to_string()
}

/// Runs the call-then-SMS sequence. Has no deduplication of its own.
#[derive(Clone)]
pub struct AlertDispatcher {
    provider: Arc<dyn CommsProvider>,
    timing: DispatchTiming,
}

impl AlertDispatcher {
    pub fn new(provider: Arc<dyn CommsProvider>, timing: DispatchTiming) -> Self {
        Self { provider, timing }
    }

    pub async fn dispatch(
        &self,
        creds: Option<&Credentials>,
        contact: &str,
        user_name: &str,
        location: &Location,
    ) -> DispatchReport {
        let Some(creds) = creds.filter(|c| c.is_complete()) else {
            warn!("❌ Provider credentials missing, alert not sent");
            return DispatchReport::rejected(ProviderError::MissingCredentials);
        };
        let contact = contact.trim();
        if contact.is_empty() {
            warn!("❌ No emergency contact configured, alert not sent");
            return DispatchReport::rejected(ProviderError::MissingContact);
        }

        let script = call_script(user_name, location);
        let body = sms_body(user_name, location);
        let mut report = DispatchReport::default();

        report
            .steps
            .push("Step 1: Initiating emergency call...".to_string());
        info!("🚨 Step 1: calling {} via {}", contact, self.provider.name());
        pause(self.timing.before_call).await;
        match self.provider.place_call(creds, contact, &script).await {
            Ok(()) => report.call_ok = true,
            Err(e) => {
                warn!("❌ Error making call: {}", e);
                report.call_error = Some(e);
            }
        }

        report
            .steps
            .push("Step 2: Sending emergency SMS...".to_string());
        info!("🚨 Step 2: texting {} via {}", contact, self.provider.name());
        pause(self.timing.before_sms).await;
        match self.provider.send_text(creds, contact, &body).await {
            Ok(()) => report.sms_ok = true,
            Err(e) => {
                warn!("❌ Error sending SMS: {}", e);
                report.sms_error = Some(e);
            }
        }

        report
            .steps
            .push("Step 3: Activating emergency siren...".to_string());
        pause(self.timing.before_siren).await;

        info!(
            "🚨 Alert sequence finished (call_ok={}, sms_ok={})",
            report.call_ok, report.sms_ok
        );
        report
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
