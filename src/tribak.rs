//! Main tribak implementation
//!
//! [`Tribak`] is the entry point for backing up and restoring single files.
//! It wires together the path normalizer, mount resolver, hasher, meta store,
//! rotation engine and restorer.
//!
//! ## Thread Safety
//!
//! Calls for the same canonical path made through one `Tribak` value are
//! serialized by a per-path lock, so the meta record's read-modify-write
//! cycle cannot interleave within a process. Nothing guards against a second
//! process working on the same path at the same time.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tribak::Tribak;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tribak = Tribak::new();
//!
//! let outcome = tribak.backup("/home/user/report.pdf")?;
//! println!("{:?}", outcome.transition);
//!
//! let restored = tribak.restore("/home/user/report.pdf")?;
//! println!("Restored to {:?}", restored.destination);
//! # Ok(())
//! # }
//! ```

use crate::copy::{FileCopier, MetadataCopier};
use crate::error::{Result, TribakError};
use crate::hash::{hash_content, hash_path};
use crate::meta::{BackupRecord, MetaStore, FIELD_DELIMITER};
use crate::mount::{resolve_mount_point, MountSource, SystemMounts};
use crate::path;
use crate::restore::{RestoreResult, Restorer};
use crate::rotation::RotationEngine;
use crate::types::{BackupOutcome, Clock, SystemClock, TribakConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A tracked path resolved to its volume
#[derive(Debug)]
struct Location {
    file_path: String,
    path_hash: String,
    mount_point: String,
    store: MetaStore,
}

/// Three-generation backup of individual files
pub struct Tribak {
    config: TribakConfig,
    mounts: Arc<dyn MountSource>,
    copier: Arc<dyn FileCopier>,
    clock: Arc<dyn Clock>,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for Tribak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tribak")
            .field("config", &self.config)
            .field("mounts", &self.mounts)
            .field("copier", &self.copier)
            .field("clock", &self.clock)
            .field("locked_paths", &self.path_locks.lock().len())
            .finish()
    }
}

impl Default for Tribak {
    fn default() -> Self {
        Self::new()
    }
}

impl Tribak {
    /// Instance using the system mount table and default configuration
    pub fn new() -> Self {
        let config = TribakConfig::default();
        Self {
            mounts: Arc::new(SystemMounts::new(config.mount_tables.clone())),
            copier: Arc::new(MetadataCopier::new(config.preserve_ownership)),
            clock: Arc::new(SystemClock),
            path_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &TribakConfig {
        &self.config
    }

    /// Back up the file at `path`
    ///
    /// Hashes the file's content and, if it differs from the newest retained
    /// generation, stores it as a new generation, evicting the oldest when all
    /// three slots are taken.
    ///
    /// # Errors
    ///
    /// - Path errors if `path` is empty, relative, on no known mount, or
    ///   contains the record delimiter `{]`
    /// - [`TribakError::HashFailed`] if the file cannot be read
    /// - [`TribakError::CopyFailed`] / [`TribakError::Io`] if storing fails;
    ///   the persisted state is left as it was
    ///
    /// An unreadable meta record is not an error: the file is treated as
    /// never backed up before.
    pub fn backup<P: AsRef<Path>>(&self, path: P) -> Result<BackupOutcome> {
        self.backup_path(path.as_ref())
    }

    #[instrument(skip(self))]
    fn backup_path(&self, path: &Path) -> Result<BackupOutcome> {
        let file_path = path::normalize(path)?;
        self.with_path_lock(&file_path, || self.backup_locked(file_path.clone()))
    }

    fn backup_locked(&self, file_path: String) -> Result<BackupOutcome> {
        let location = self.locate(file_path)?;
        let content_hash = hash_content(Path::new(&location.file_path), self.config.chunk_size)?;

        location.store.ensure_layout()?;
        let record = location
            .store
            .load_or_fresh(&location.file_path, &location.path_hash)?;

        let engine = RotationEngine::new(&location.store, self.copier.as_ref());
        let (record, transition) = engine.apply(
            record,
            Path::new(&location.file_path),
            &content_hash,
            self.clock.now(),
        )?;

        debug!("Backup of {} finished: {:?}", location.file_path, transition);
        Ok(BackupOutcome {
            transition,
            record,
            mount_point: location.mount_point,
        })
    }

    /// Restore the newest generation of `path` next to it
    ///
    /// The content is written to `<stem>-<YYYYMMDDhhmmss><ext>` in the same
    /// directory; the tracked file itself is not modified.
    ///
    /// # Errors
    ///
    /// - Path errors as for [`Tribak::backup`]
    /// - [`TribakError::NothingToRestore`] if no generation is retained
    /// - Format errors if the meta record is unreadable
    pub fn restore<P: AsRef<Path>>(&self, path: P) -> Result<RestoreResult> {
        self.restore_path(path.as_ref())
    }

    #[instrument(skip(self))]
    fn restore_path(&self, path: &Path) -> Result<RestoreResult> {
        let file_path = path::normalize(path)?;
        self.with_path_lock(&file_path, || {
            let location = self.locate(file_path.clone())?;
            let record = location
                .store
                .load(&location.path_hash)?
                .ok_or_else(|| TribakError::NothingToRestore(location.file_path.clone()))?;

            Restorer::new(&location.store, self.copier.as_ref()).restore(&record)
        })
    }

    /// Read the persisted record for `path` without changing anything
    pub fn record<P: AsRef<Path>>(&self, path: P) -> Result<Option<BackupRecord>> {
        let file_path = path::normalize(path.as_ref())?;
        let location = self.locate(file_path)?;
        location.store.load(&location.path_hash)
    }

    fn locate(&self, file_path: String) -> Result<Location> {
        if file_path.contains(FIELD_DELIMITER) {
            return Err(TribakError::UnencodablePath(file_path));
        }

        let mount_point = resolve_mount_point(&file_path, self.mounts.as_ref())?;
        let store = MetaStore::new(Path::new(&mount_point), &self.config.root_marker);
        let path_hash = hash_path(&file_path);

        Ok(Location {
            file_path,
            path_hash,
            mount_point,
            store,
        })
    }

    /// Run `f` while holding the lock for `file_path`
    ///
    /// The registry entry is dropped again once no other caller holds or
    /// waits on it, so the map only contains paths currently in use.
    fn with_path_lock<T>(&self, file_path: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .path_locks
            .lock()
            .entry(file_path.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.path_locks.lock();
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(file_path);
        }
        // Release our reference before other callers can inspect the count
        drop(lock);
        drop(locks);

        result
    }
}

/// Builder for [`Tribak`] with custom configuration and collaborators
///
/// Default configuration:
/// - `root_marker`: `tribak`
/// - `chunk_size`: 8192
/// - `preserve_ownership`: true
/// - mounts read from `/etc/mtab`, falling back to `/proc/mounts`
#[derive(Debug, Default)]
pub struct TribakBuilder {
    config: TribakConfig,
    mounts: Option<Arc<dyn MountSource>>,
    copier: Option<Arc<dyn FileCopier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TribakBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: TribakConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the hidden directory on each volume, without the leading dot
    pub fn root_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.root_marker = marker.into();
        self
    }

    /// Read size for content hashing
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Whether the default copier copies owner and group
    pub fn preserve_ownership(mut self, preserve: bool) -> Self {
        self.config.preserve_ownership = preserve;
        self
    }

    /// Use `source` instead of the system mount table
    pub fn mount_source(mut self, source: impl MountSource + 'static) -> Self {
        self.mounts = Some(Arc::new(source));
        self
    }

    /// Use `copier` instead of [`MetadataCopier`]
    pub fn copier(mut self, copier: impl FileCopier + 'static) -> Self {
        self.copier = Some(Arc::new(copier));
        self
    }

    /// Use `clock` for generation timestamps
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate the configuration and build the instance
    pub fn build(self) -> Result<Tribak> {
        self.config.validate()?;

        let config = self.config;
        let mounts = self
            .mounts
            .unwrap_or_else(|| Arc::new(SystemMounts::new(config.mount_tables.clone())));
        let copier = self
            .copier
            .unwrap_or_else(|| Arc::new(MetadataCopier::new(config.preserve_ownership)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        info!("Backups stored under .{} on each volume", config.root_marker);

        Ok(Tribak {
            config,
            mounts,
            copier,
            clock,
            path_locks: Mutex::new(HashMap::new()),
        })
    }
}
