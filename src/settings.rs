//! Settings Store
//!
//! Persists the user's name, emergency contact and provider credentials as
//! JSON. Loading never fails; saving replaces the file atomically.

use crate::error::{SosError, SosResult};
use crate::provider::Credentials;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("valid phone regex");
}

/// The persisted settings record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_name: String,
    pub emergency_contact: String,
    pub provider_account_id: String,
    pub provider_auth_secret: String,
    pub provider_phone_number: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_name: "User".to_string(),
            emergency_contact: String::new(),
            provider_account_id: String::new(),
            provider_auth_secret: String::new(),
            provider_phone_number: String::new(),
        }
    }
}

impl Settings {
    /// Provider credentials, if all three values are present
    pub fn credentials(&self) -> Option<Credentials> {
        let creds = Credentials {
            account_id: self.provider_account_id.trim().to_string(),
            auth_secret: self.provider_auth_secret.trim().to_string(),
            from_number: self.provider_phone_number.trim().to_string(),
        };
        creds.is_complete().then_some(creds)
    }

    /// Warnings to show next to the settings form. Never blocks saving.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.emergency_contact.is_empty() && !validate_phone(&self.emergency_contact) {
            warnings.push(
                "Emergency contact should include the country code, e.g. +1234567890".to_string(),
            );
        }
        if !self.provider_phone_number.is_empty() && !validate_phone(&self.provider_phone_number) {
            warnings.push("Provider phone number does not look like an E.164 number".to_string());
        }
        warnings
    }
}

/// Loose E.164 check: `+` then 7-15 digits
pub fn validate_phone(number: &str) -> bool {
    PHONE_RE.is_match(number.trim())
}

/// File-backed settings store
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record, falling back to defaults on any failure
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            debug!("No settings file at {:?}, using defaults", self.path);
            return Settings::default();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("⚠️ Could not read settings {:?}: {}", self.path, e);
                return Settings::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("⚠️ Settings file corrupted or invalid, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Overwrite the persisted record.
    ///
    /// Writes a sibling temp file and renames it over the target, so a
    /// failed write leaves the previous file untouched.
    pub fn save(&self, settings: &Settings) -> SosResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(settings)?;
        let tmp_path = self.tmp_path();

        let write_result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SosError::Settings(format!(
                "could not write {:?}: {}",
                tmp_path, e
            )));
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            SosError::Settings(format!("could not replace {:?}: {}", self.path, e))
        })?;

        info!("💾 Settings saved to {:?}", self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
