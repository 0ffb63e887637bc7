//! Mock Communications Provider for Testing
//!
//! Records every call and text so tests can check order and content.

use async_trait::async_trait;
use sos_alert::error::ProviderError;
use sos_alert::provider::{CommsProvider, Credentials};
use std::sync::{Arc, Mutex};

/// One provider invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Call { to: String, script: String },
    Text { to: String, body: String },
}

/// Mock provider that records what it was asked to send
#[derive(Debug, Default)]
pub struct MockProvider {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    /// Simulate failure of the call channel
    pub fail_call: Arc<Mutex<bool>>,
    /// Simulate failure of the SMS channel
    pub fail_sms: Arc<Mutex<bool>>,
    /// Fail this many upcoming calls, then succeed
    pub fail_next_calls: Arc<Mutex<usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_sms() -> Self {
        let mock = Self::new();
        *mock.fail_sms.lock().unwrap() = true;
        mock
    }

    pub fn get_sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.get_sent()
            .iter()
            .filter(|s| matches!(s, Sent::Call { .. }))
            .count()
    }

    pub fn text_count(&self) -> usize {
        self.get_sent()
            .iter()
            .filter(|s| matches!(s, Sent::Text { .. }))
            .count()
    }
}

#[async_trait]
impl CommsProvider for MockProvider {
    async fn place_call(
        &self,
        _creds: &Credentials,
        to: &str,
        script: &str,
    ) -> Result<(), ProviderError> {
        self.sent.lock().unwrap().push(Sent::Call {
            to: to.to_string(),
            script: script.to_string(),
        });
        if *self.fail_call.lock().unwrap() {
            return Err(ProviderError::Network("mock call failure".to_string()));
        }
        let mut remaining = self.fail_next_calls.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ProviderError::Network("mock early call failure".to_string()));
        }
        Ok(())
    }

    async fn send_text(
        &self,
        _creds: &Credentials,
        to: &str,
        body: &str,
    ) -> Result<(), ProviderError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.to_string(),
            body: body.to_string(),
        });
        if *self.fail_sms.lock().unwrap() {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "mock SMS failure".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
