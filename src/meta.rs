//! Meta records and their on-disk store
//!
//! Every tracked file has one small text record describing its retained
//! generations. Records live beside the generation data files under a
//! hidden directory at the root of the file's volume:
//!
//! ```text
//! <mount>/.<marker>/
//! ├── meta/
//! │   └── <pathHash>          # one record per tracked file
//! └── backup/
//!     ├── <pathHash>-1        # oldest retained generation
//!     ├── <pathHash>-2
//!     └── <pathHash>-3        # newest when all three are occupied
//! ```
//!
//! ## Record format
//!
//! Version 1 records are ten fields joined by `{]`:
//!
//! ```text
//! version{]filePath{]pathHash{]uploadFlag{]md5_1{]ts1{]md5_2{]ts2{]md5_3{]ts3
//! ```
//!
//! An empty slot is written as an empty digest and timestamp `0`.

use crate::error::{Result, TribakError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Current record schema version
pub const META_VERSION: u32 = 1;

/// Separator between record fields
pub const FIELD_DELIMITER: &str = "{]";

/// Number of fields in a version 1 record
pub const V1_FIELD_COUNT: usize = 10;

/// Number of generation slots per file
pub const GENERATION_COUNT: usize = 3;

/// One retained content state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Hex digest of the content
    pub content_hash: String,
    /// Seconds since the Unix epoch when this content was backed up
    pub timestamp: i64,
}

impl Generation {
    /// Create a generation
    pub fn new(content_hash: impl Into<String>, timestamp: i64) -> Self {
        Self {
            content_hash: content_hash.into(),
            timestamp,
        }
    }
}

/// Persisted description of a tracked file's generations
///
/// `slots[0]` is G1 (oldest), `slots[2]` is G3. Slots are always filled
/// from G1 upward without gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Schema version
    pub version: u32,
    /// Canonical absolute path of the tracked file
    pub file_path: String,
    /// Digest of `file_path`
    pub path_hash: String,
    /// Auxiliary flag carried through unchanged
    pub upload_flag: bool,
    /// Generation slots G1..G3
    pub slots: [Option<Generation>; GENERATION_COUNT],
}

impl BackupRecord {
    /// Create a record with every slot empty
    pub fn new(file_path: impl Into<String>, path_hash: impl Into<String>) -> Self {
        Self {
            version: META_VERSION,
            file_path: file_path.into(),
            path_hash: path_hash.into(),
            upload_flag: false,
            slots: [None, None, None],
        }
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().take_while(|s| s.is_some()).count()
    }

    /// The highest occupied slot as `(slot number, generation)`
    pub fn latest(&self) -> Option<(usize, &Generation)> {
        self.slots
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, slot)| slot.as_ref().map(|g| (i + 1, g)))
    }

    /// Generation stored in `slot` (1-based)
    pub fn generation(&self, slot: usize) -> Option<&Generation> {
        slot.checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Check that slots are filled contiguously from G1
    pub fn is_contiguous(&self) -> bool {
        let occupied = self.occupied();
        self.slots[occupied..].iter().all(Option::is_none)
    }

    /// Serialize into the delimited text format
    pub fn encode(&self) -> String {
        let mut fields: Vec<String> = Vec::with_capacity(V1_FIELD_COUNT);
        fields.push(self.version.to_string());
        fields.push(self.file_path.clone());
        fields.push(self.path_hash.clone());
        fields.push(if self.upload_flag { "1" } else { "0" }.to_string());
        for slot in &self.slots {
            match slot {
                Some(generation) => {
                    fields.push(generation.content_hash.clone());
                    fields.push(generation.timestamp.to_string());
                }
                None => {
                    fields.push(String::new());
                    fields.push("0".to_string());
                }
            }
        }
        fields.join(FIELD_DELIMITER)
    }

    /// Parse the delimited text format
    ///
    /// # Errors
    ///
    /// - [`TribakError::UnsupportedVersion`] for unknown or unparsable versions
    /// - [`TribakError::FieldCount`] if the field count does not match the version
    /// - [`TribakError::InvalidField`] for malformed flags, timestamps or gaps
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = text.split(FIELD_DELIMITER).collect();

        let version: u32 = fields[0]
            .trim()
            .parse()
            .map_err(|_| TribakError::UnsupportedVersion(fields[0].to_string()))?;

        match version {
            1 => Self::decode_v1(&fields),
            other => Err(TribakError::UnsupportedVersion(other.to_string())),
        }
    }

    fn decode_v1(fields: &[&str]) -> Result<Self> {
        if fields.len() != V1_FIELD_COUNT {
            return Err(TribakError::FieldCount {
                version: 1,
                expected: V1_FIELD_COUNT,
                actual: fields.len(),
            });
        }

        let upload_flag = match fields[3] {
            "1" => true,
            "0" => false,
            other => return Err(TribakError::invalid_field("uploadFlag", other)),
        };

        let mut slots: [Option<Generation>; GENERATION_COUNT] = [None, None, None];
        for (i, slot) in slots.iter_mut().enumerate() {
            let content_hash = fields[4 + i * 2];
            let raw_ts = fields[5 + i * 2];
            let timestamp: i64 = raw_ts
                .parse()
                .map_err(|_| TribakError::invalid_field("timestamp", raw_ts))?;
            if !content_hash.is_empty() {
                *slot = Some(Generation::new(content_hash, timestamp));
            }
        }

        let record = Self {
            version: 1,
            file_path: fields[1].to_string(),
            path_hash: fields[2].to_string(),
            upload_flag,
            slots,
        };

        if !record.is_contiguous() {
            return Err(TribakError::invalid_field("slots", "gap between occupied slots"));
        }

        Ok(record)
    }
}

/// Reader/writer for meta records and generation file locations on one volume
#[derive(Debug, Clone)]
pub struct MetaStore {
    root: PathBuf,
}

impl MetaStore {
    /// Store rooted at `<mount_point>/.<marker>`
    pub fn new(mount_point: &Path, marker: &str) -> Self {
        Self {
            root: mount_point.join(format!(".{}", marker)),
        }
    }

    /// Directory holding meta records
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    /// Directory holding generation data files
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backup")
    }

    /// Location of the record for `path_hash`
    pub fn meta_path(&self, path_hash: &str) -> PathBuf {
        self.meta_dir().join(path_hash)
    }

    /// Location of the data file for generation `slot` (1-based)
    pub fn generation_path(&self, path_hash: &str, slot: usize) -> PathBuf {
        self.backup_dir().join(format!("{}-{}", path_hash, slot))
    }

    /// Create the meta and backup directories if needed
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.meta_dir(), self.backup_dir()] {
            create_dir_all_with_mode(&dir)?;
        }
        Ok(())
    }

    /// Load the record for `path_hash`
    ///
    /// A missing record is `Ok(None)`. Format problems are returned as errors
    /// so callers can decide how strict to be; see [`MetaStore::load_or_fresh`].
    pub fn load(&self, path_hash: &str) -> Result<Option<BackupRecord>> {
        let meta_path = self.meta_path(path_hash);
        let text = match fs::read_to_string(&meta_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("No meta record at {:?}", meta_path);
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(TribakError::invalid_field("record", "not valid UTF-8"));
            }
            Err(e) => return Err(e.into()),
        };

        let record = BackupRecord::decode(&text)?;
        if record.path_hash != path_hash {
            return Err(TribakError::PathHashMismatch {
                expected: path_hash.to_string(),
                actual: record.path_hash,
            });
        }

        debug!(
            "Loaded meta record {} with {} generation(s)",
            path_hash,
            record.occupied()
        );
        Ok(Some(record))
    }

    /// Load the record, treating an unreadable record as no record at all
    ///
    /// Corruption costs the file's history but never blocks a new backup.
    /// I/O errors other than "not found" still propagate.
    pub fn load_or_fresh(&self, file_path: &str, path_hash: &str) -> Result<BackupRecord> {
        match self.load(path_hash) {
            Ok(Some(mut record)) => {
                record.file_path = file_path.to_string();
                Ok(record)
            }
            Ok(None) => Ok(BackupRecord::new(file_path, path_hash)),
            Err(e) if e.is_format() => {
                warn!(
                    "Discarding unreadable meta record for {}: {}",
                    file_path, e
                );
                Ok(BackupRecord::new(file_path, path_hash))
            }
            Err(e) => Err(e),
        }
    }

    /// Write the record, replacing any previous version atomically
    pub fn save(&self, record: &BackupRecord) -> Result<()> {
        let meta_dir = self.meta_dir();
        let target = self.meta_path(&record.path_hash);

        let mut temp = NamedTempFile::new_in(&meta_dir)?;
        temp.write_all(record.encode().as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| TribakError::Io(e.error))?;

        debug!("Saved meta record {:?}", target);
        Ok(())
    }
}

#[cfg(unix)]
fn create_dir_all_with_mode(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_all_with_mode(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}
