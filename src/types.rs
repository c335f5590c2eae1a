//! Shared data types: configuration, operation results and the clock
//!
//! ## Examples
//!
//! ```rust
//! use tribak::types::TribakConfig;
//!
//! let config = TribakConfig {
//!     root_marker: "my-backups".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Result, TribakError};
use crate::hash::DEFAULT_CHUNK_SIZE;
use crate::meta::BackupRecord;
use crate::mount::default_mount_tables;
use crate::rotation::Transition;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default name of the hidden directory created on each volume (without the dot)
pub const DEFAULT_ROOT_MARKER: &str = "tribak";

/// Configuration for a [`crate::Tribak`] instance
///
/// Can be built in code, through [`crate::TribakBuilder`], or read from a
/// JSON file with [`TribakConfig::load`]. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TribakConfig {
    /// Hidden directory name under each mount point, stored as `.<root_marker>`
    pub root_marker: String,
    /// Read size used when hashing file content
    pub chunk_size: usize,
    /// Copy owner and group onto generation and restored files
    pub preserve_ownership: bool,
    /// Mount tables tried in order when resolving mount points
    pub mount_tables: Vec<PathBuf>,
}

impl Default for TribakConfig {
    fn default() -> Self {
        Self {
            root_marker: DEFAULT_ROOT_MARKER.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            preserve_ownership: true,
            mount_tables: default_mount_tables(),
        }
    }
}

impl TribakConfig {
    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: TribakConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would break the on-disk layout
    pub fn validate(&self) -> Result<()> {
        let marker = self.root_marker.as_str();
        if marker.is_empty() || marker == "." || marker == ".." {
            return Err(TribakError::config("root_marker must be a plain directory name"));
        }
        if marker.contains('/') || marker.contains('\0') {
            return Err(TribakError::config(format!(
                "root_marker {:?} must not contain '/' or NUL",
                marker
            )));
        }
        if self.chunk_size == 0 {
            return Err(TribakError::config("chunk_size must be greater than zero"));
        }
        Ok(())
    }
}

/// Result of a backup call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    /// What happened to the record
    pub transition: Transition,
    /// Record as persisted after the call
    pub record: BackupRecord,
    /// Mount point the backup lives under
    pub mount_point: String,
}

impl BackupOutcome {
    /// True if the call stored new content
    pub fn changed(&self) -> bool {
        !self.transition.is_noop()
    }
}

/// Source of "now" for generation timestamps
pub trait Clock: Send + Sync + fmt::Debug {
    /// Seconds since the Unix epoch
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
