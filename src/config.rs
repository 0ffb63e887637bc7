use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "SOS_ALERT_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Persistence
    pub settings_path: String,
    pub audit_log_enabled: bool,
    pub audit_log_path: String,

    // Location
    pub base_latitude: f64,
    pub base_longitude: f64,
    pub jitter_degrees: f64,
    pub location_delay_ms: u64,
    pub geocoder_enabled: bool,
    pub geocoder_url: String,
    pub geocoder_timeout_ms: u64,

    // Provider
    pub provider_api_base: String,
    pub provider_timeout_secs: u64,

    // Alert sequence pacing
    pub call_delay_ms: u64,
    pub sms_delay_ms: u64,
    pub siren_delay_ms: u64,

    // Page
    pub siren_path: String,
    pub voice_poll_interval_ms: u64,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8501".to_string(),
            settings_path: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sos-alert/settings.json")
                .to_string_lossy()
                .to_string(),
            audit_log_enabled: true,
            audit_log_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sos-alert/audit.log")
                .to_string_lossy()
                .to_string(),
            base_latitude: 28.5796481,
            base_longitude: 76.9759274,
            jitter_degrees: 0.05,
            location_delay_ms: 2000,
            geocoder_enabled: true,
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            geocoder_timeout_ms: 5000,
            provider_api_base: "https://api.twilio.com".to_string(),
            provider_timeout_secs: 15,
            call_delay_ms: 2000,
            sms_delay_ms: 2000,
            siren_delay_ms: 1000,
            siren_path: "siren.mp3".to_string(),
            voice_poll_interval_ms: 1000,
            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path with graceful degradation
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                // Keep the corrupt file around for debugging
                let backup_path = config_path.with_extension("json.corrupt");
                let _ = std::fs::rename(config_path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_millis(self.geocoder_timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Config tuned for tests: no artificial pauses, no network geocoding
    pub fn for_testing(dir: &Path) -> Self {
        Self {
            settings_path: dir.join("settings.json").to_string_lossy().to_string(),
            audit_log_path: dir.join("audit.log").to_string_lossy().to_string(),
            location_delay_ms: 0,
            geocoder_enabled: false,
            call_delay_ms: 0,
            sms_delay_ms: 0,
            siren_delay_ms: 0,
            siren_path: dir.join("siren.mp3").to_string_lossy().to_string(),
            ..Self::default()
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sos-alert")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_address, "127.0.0.1:8501");
        assert_eq!(config.jitter_degrees, 0.05);
        assert_eq!(config.call_delay_ms, 2000);
        assert!(config.geocoder_enabled);
        assert!(config.settings_path.ends_with("settings.json"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "bind_address": "0.0.0.0:9000", "sms_delay_ms": 10 }"#;
        let config: Config = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.sms_delay_ms, 10);
        assert_eq!(config.call_delay_ms, 2000);
        assert_eq!(config.geocoder_timeout_ms, 5000);
    }

    #[test]
    fn test_config_corrupt_json_handling() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let config = Config::load_from(&path).expect("load should degrade gracefully");
        assert_eq!(config.bind_address, Config::default().bind_address);
        assert!(!path.exists());
        assert!(dir.path().join("config.json.corrupt").exists());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested/config.json");
        let config = Config {
            siren_path: "/tmp/alarm.mp3".to_string(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let restored = Config::load_from(&path).unwrap();
        assert_eq!(restored.siren_path, "/tmp/alarm.mp3");
    }
}
