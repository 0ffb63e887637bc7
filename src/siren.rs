//! Emergency siren audio for the active-alert view

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Larger files are not inlined into the page
const MAX_SIREN_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Siren {
    path: PathBuf,
}

impl Siren {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_available(&self) -> bool {
        self.path.is_file()
    }

    /// The siren as a `data:` URI, or the reason it could not be loaded
    pub fn data_uri(&self) -> Result<String, String> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| {
            debug!("Siren file {:?} unavailable: {}", self.path, e);
            format!("Could not load siren audio: {}", e)
        })?;
        if metadata.len() > MAX_SIREN_BYTES {
            warn!("⚠️ Siren file {:?} too large to embed", self.path);
            return Err(format!(
                "Could not load siren audio: file is larger than {} MB",
                MAX_SIREN_BYTES / (1024 * 1024)
            ));
        }

        let bytes = std::fs::read(&self.path)
            .map_err(|e| format!("Could not load siren audio: {}", e))?;
        Ok(format!("data:audio/mpeg;base64,{}", STANDARD.encode(bytes)))
    }
}
