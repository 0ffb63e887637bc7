//! Communications Provider Module
//!
//! Two operations cross this boundary: placing a voice call that speaks a
//! script, and sending a text message. Each returns its own result.

use crate::error::ProviderError;
use async_trait::async_trait;

pub mod twilio;

pub use twilio::TwilioProvider;

/// The three credential values every provider operation needs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub account_id: String,
    pub auth_secret: String,
    pub from_number: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.account_id.is_empty() && !self.auth_secret.is_empty() && !self.from_number.is_empty()
    }
}

/// Trait for call/SMS providers
#[async_trait]
pub trait CommsProvider: Send + Sync {
    /// Place a voice call to `to` that speaks `script`
    async fn place_call(
        &self,
        creds: &Credentials,
        to: &str,
        script: &str,
    ) -> Result<(), ProviderError>;

    /// Send a text message with `body` to `to`
    async fn send_text(
        &self,
        creds: &Credentials,
        to: &str,
        body: &str,
    ) -> Result<(), ProviderError>;

    /// Get the provider name
    fn name(&self) -> &str;
}
