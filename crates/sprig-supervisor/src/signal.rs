//! Manual approval flag
//!
//! A plain file whose presence means "an operator approved the next step".
//! The supervisor polls it; there is no push notification.

use chrono::Utc;
use sprig_core::fail_open::fail_open_sync;
use sprig_core::{Result, SprigConfig};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ApprovalSignal {
    path: PathBuf,
    consume: bool,
}

impl ApprovalSignal {
    pub fn new(path: impl Into<PathBuf>, consume: bool) -> Self {
        Self {
            path: path.into(),
            consume,
        }
    }

    pub fn from_config(config: &SprigConfig) -> Self {
        Self::new(
            config.approval_flag_path(),
            config.supervisor.consume_approval_flag,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// Use the approval once. Returns whether it was present.
    pub fn take(&self) -> bool {
        if !self.is_present() {
            return false;
        }
        if self.consume {
            fail_open_sync("consume approval flag", || {
                std::fs::remove_file(&self.path)?;
                Ok(())
            });
        }
        info!("Manual approval flag found at {}", self.path.display());
        true
    }

    /// Create the flag
    pub fn grant(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("approved {}\n", Utc::now().to_rfc3339()))?;
        Ok(())
    }
}
