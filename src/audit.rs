//! Append-only audit trail of alert activations and their outcomes.

use crate::dispatcher::DispatchReport;
use crate::state::TriggerSource;
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        if config.audit_log_enabled {
            Self::new(&config.audit_log_path)
        } else {
            Self::disabled()
        }
    }

    /// Write an entry to the audit log
    pub fn log(&self, entry: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(
            file,
            "[{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            entry
        )?;
        Ok(())
    }

    /// Record a finished alert sequence. Failures are only logged.
    pub fn record_alert(&self, source: Option<&TriggerSource>, report: &DispatchReport) {
        let source = source
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let describe = |ok: bool, err: &Option<crate::error::ProviderError>| match (ok, err) {
            (true, _) => "ok".to_string(),
            (false, Some(e)) => format!("failed ({})", e),
            (false, None) => "failed".to_string(),
        };
        let entry = format!(
            "SOS ACTIVATED by {} | call: {} | sms: {}",
            source,
            describe(report.call_ok, &report.call_error),
            describe(report.sms_ok, &report.sms_error)
        );
        if let Err(e) = self.log(&entry) {
            warn!("Failed to write audit log: {}", e);
        }
    }

    /// Record a user reset
    pub fn record_reset(&self) {
        if let Err(e) = self.log("SOS RESET by user") {
            warn!("Failed to write audit log: {}", e);
        }
    }
}
