//! Twilio REST provider

use super::{CommsProvider, Credentials};
use crate::config::Config;
use crate::error::ProviderError;
use anyhow::Result;
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Closing line spoken after the emergency message on every loop
const CALL_FOLLOW_UP: &str = "This is an automated emergency call. Please respond immediately.";

/// Error body returned by the Twilio API
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

/// Places calls and sends SMS through the Twilio REST API
pub struct TwilioProvider {
    client: Client,
    api_base: String,
}

impl TwilioProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.provider_timeout())
            .build()?;
        Ok(Self {
            client,
            api_base: config.provider_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, creds: &Credentials, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}.json",
            self.api_base,
            urlencoding::encode(&creds.account_id),
            resource
        )
    }

    async fn post_form(
        &self,
        creds: &Credentials,
        resource: &str,
        form: &[(&str, &str)],
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(creds, resource);
        debug!("Twilio request: POST {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.account_id, Some(&creds.auth_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TwilioErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        warn!("❌ Twilio {} rejected ({}): {}", resource, status, message);
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CommsProvider for TwilioProvider {
    async fn place_call(
        &self,
        creds: &Credentials,
        to: &str,
        script: &str,
    ) -> Result<(), ProviderError> {
        let twiml = call_twiml(script).map_err(ProviderError::Network)?;
        self.post_form(
            creds,
            "Calls",
            &[("To", to), ("From", &creds.from_number), ("Twiml", &twiml)],
        )
        .await?;
        info!("📞 Emergency call placed to {}", to);
        Ok(())
    }

    async fn send_text(
        &self,
        creds: &Credentials,
        to: &str,
        body: &str,
    ) -> Result<(), ProviderError> {
        self.post_form(
            creds,
            "Messages",
            &[("To", to), ("From", &creds.from_number), ("Body", body)],
        )
        .await?;
        info!("✉️ Emergency SMS sent to {}", to);
        Ok(())
    }

    fn name(&self) -> &str {
        "twilio"
    }
}

/// Build the TwiML document for the emergency call.
///
/// The message is said, followed by a fixed follow-up, and `<Redirect/>`
/// loops the document until the callee hangs up.
pub fn call_twiml(script: &str) -> Result<String, String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let opening = format!("Emergency alert. {}", script);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::Start(BytesStart::new("Response")))
        .map_err(|e| e.to_string())?;
    for line in [opening.as_str(), CALL_FOLLOW_UP] {
        writer
            .write_event(Event::Start(
                BytesStart::new("Say").with_attributes([("voice", "woman"), ("language", "en-US")]),
            ))
            .map_err(|e| e.to_string())?;
        writer
            .write_event(Event::Text(BytesText::new(line)))
            .map_err(|e| e.to_string())?;
        writer
            .write_event(Event::End(BytesEnd::new("Say")))
            .map_err(|e| e.to_string())?;
        writer
            .write_event(Event::Empty(
                BytesStart::new("Pause").with_attributes([("length", "1")]),
            ))
            .map_err(|e| e.to_string())?;
    }
    writer
        .write_event(Event::Empty(BytesStart::new("Redirect")))
        .map_err(|e| e.to_string())?;
    writer
        .write_event(Event::End(BytesEnd::new("Response")))
        .map_err(|e| e.to_string())?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| e.to_string())
}
