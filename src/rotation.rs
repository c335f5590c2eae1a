//! Generation rotation
//!
//! Decides what a backup call does with a file's record and carries it out.
//! The record moves through four states by number of occupied slots:
//!
//! ```text
//!   Empty ──new──▶ One ──new──▶ Two ──new──▶ Full ──new──▶ Full (G1 evicted)
//!                  │ same        │ same        │ same
//!                  ▼             ▼             ▼
//!                 One           Two           Full
//! ```
//!
//! "same" means the new fingerprint equals the fingerprint in the highest
//! occupied slot. Older slots are never compared, so content that reverts to
//! an earlier generation is recorded again as a new generation.
//!
//! ## Failure behavior
//!
//! New content is first copied into a staging file inside the backup
//! directory. Existing generation files are only shifted, and the record only
//! saved, once that copy has succeeded. A failed copy therefore leaves both
//! the data files and the persisted record as they were.
//!
//! During a rotation the evicted generation is parked in a scratch file until
//! the new generation is in place. If a rename fails part way through, or a
//! generation file the record lists is missing, the files already moved are
//! put back and the call fails with the record unchanged.

use crate::copy::FileCopier;
use crate::error::{Result, TribakError};
use crate::meta::{BackupRecord, Generation, MetaStore, GENERATION_COUNT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Record state by number of occupied slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// No generation retained
    Empty,
    /// G1 occupied
    One,
    /// G1 and G2 occupied
    Two,
    /// All three slots occupied
    Full,
}

impl Occupancy {
    /// State of `record`
    pub fn of(record: &BackupRecord) -> Self {
        match record.occupied() {
            0 => Occupancy::Empty,
            1 => Occupancy::One,
            2 => Occupancy::Two,
            _ => Occupancy::Full,
        }
    }
}

/// What a backup call did, or will do, to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Content matches the newest generation in `slot`; nothing written
    Unchanged {
        /// Slot holding the matching generation
        slot: usize,
    },
    /// Content stored in the next free `slot`
    Grow {
        /// Slot that was filled
        slot: usize,
    },
    /// Oldest generation evicted, content stored in G3
    Rotate,
}

impl Transition {
    /// True if nothing was written
    pub fn is_noop(&self) -> bool {
        matches!(self, Transition::Unchanged { .. })
    }

    /// Slot that received new content, if any
    pub fn written_slot(&self) -> Option<usize> {
        match self {
            Transition::Unchanged { .. } => None,
            Transition::Grow { slot } => Some(*slot),
            Transition::Rotate => Some(GENERATION_COUNT),
        }
    }
}

/// Decide the transition for `content_hash` without touching anything
pub fn plan(record: &BackupRecord, content_hash: &str) -> Transition {
    if let Some((slot, latest)) = record.latest() {
        if latest.content_hash == content_hash {
            return Transition::Unchanged { slot };
        }
    }

    match Occupancy::of(record) {
        Occupancy::Empty => Transition::Grow { slot: 1 },
        Occupancy::One => Transition::Grow { slot: 2 },
        Occupancy::Two => Transition::Grow { slot: 3 },
        Occupancy::Full => Transition::Rotate,
    }
}

/// Applies transitions to records and generation files on one volume
#[derive(Debug)]
pub struct RotationEngine<'a> {
    store: &'a MetaStore,
    copier: &'a dyn FileCopier,
}

impl<'a> RotationEngine<'a> {
    /// Engine writing through `store` and copying with `copier`
    pub fn new(store: &'a MetaStore, copier: &'a dyn FileCopier) -> Self {
        Self { store, copier }
    }

    /// Back up `source` with fingerprint `content_hash` taken at `now`
    ///
    /// Returns the record as persisted and the transition taken. On a no-op
    /// the record is returned untouched and not saved again.
    pub fn apply(
        &self,
        mut record: BackupRecord,
        source: &Path,
        content_hash: &str,
        now: i64,
    ) -> Result<(BackupRecord, Transition)> {
        let transition = plan(&record, content_hash);
        let path_hash = record.path_hash.clone();

        match transition {
            Transition::Unchanged { slot } => {
                debug!("{} unchanged since generation {}", record.file_path, slot);
                return Ok((record, transition));
            }
            Transition::Grow { slot } => {
                let staged = self.stage(source, &path_hash)?;
                self.commit(staged, &path_hash, slot)?;
                record.slots[slot - 1] = Some(Generation::new(content_hash, now));
            }
            Transition::Rotate => {
                let staged = self.stage(source, &path_hash)?;
                self.rotate_in(staged, &path_hash)?;
                record.slots.rotate_left(1);
                record.slots[GENERATION_COUNT - 1] = Some(Generation::new(content_hash, now));
                debug!("Evicted oldest generation of {}", record.file_path);
            }
        }

        self.store.save(&record)?;
        if let Some(slot) = transition.written_slot() {
            info!("Stored {} as generation {}", record.file_path, slot);
        }
        Ok((record, transition))
    }

    /// Copy `source` into a staging file that is removed unless committed
    fn stage(&self, source: &Path, path_hash: &str) -> Result<TempPath> {
        let staging = self.scratch_path(path_hash, ".staging")?;
        self.copier.copy(source, &staging)?;
        Ok(staging)
    }

    /// Empty scratch file in the backup directory, removed on drop
    fn scratch_path(&self, path_hash: &str, suffix: &str) -> Result<TempPath> {
        Ok(tempfile::Builder::new()
            .prefix(&format!("{}-", path_hash))
            .suffix(suffix)
            .tempfile_in(self.store.backup_dir())?
            .into_temp_path())
    }

    /// Move a staged copy into generation `slot`
    fn commit(&self, staged: TempPath, path_hash: &str, slot: usize) -> Result<()> {
        let target = self.store.generation_path(path_hash, slot);
        staged
            .persist(&target)
            .map_err(|e| TribakError::Io(e.error))?;
        Ok(())
    }

    /// Evict generation 1, move 2 → 1 and 3 → 2, then commit `staged` as 3
    ///
    /// Generation 1 is parked in a scratch file until the commit succeeds.
    /// Any failure moves the files back, so the data files keep matching the
    /// saved record.
    fn rotate_in(&self, staged: TempPath, path_hash: &str) -> Result<()> {
        let retired = self.scratch_path(path_hash, ".retired")?;
        let oldest = self.store.generation_path(path_hash, 1);
        rename_generation(&oldest, &retired, 1)?;

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(GENERATION_COUNT - 1);
        let result = (|| {
            for slot in 2..=GENERATION_COUNT {
                let from = self.store.generation_path(path_hash, slot);
                let to = self.store.generation_path(path_hash, slot - 1);
                rename_generation(&from, &to, slot)?;
                moved.push((from, to));
            }
            self.commit(staged, path_hash, GENERATION_COUNT)
        })();

        if let Err(e) = result {
            warn!("Rotation failed, restoring previous generations: {}", e);
            for (from, to) in moved.iter().rev() {
                undo_rename(to, from);
            }
            undo_rename(&retired, &oldest);
            return Err(e);
        }

        Ok(())
    }
}

fn rename_generation(from: &Path, to: &Path, slot: usize) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TribakError::MissingGeneration {
            slot,
            path: from.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn undo_rename(from: &Path, to: &Path) {
    if let Err(e) = fs::rename(from, to) {
        warn!("Could not move {:?} back to {:?}: {}", from, to, e);
    }
}
