//! Restoring the newest generation
//!
//! A restore never overwrites the tracked file. The newest retained
//! generation is copied next to it under a name that carries the
//! generation's timestamp:
//!
//! ```text
//! /home/user/report.pdf  ──▶  /home/user/report-20250111120000.pdf
//! /srv/data/dump.tar.gz  ──▶  /srv/data/dump-20250111120000.tar.gz
//! ```

use crate::copy::FileCopier;
use crate::error::{Result, TribakError};
use crate::meta::{BackupRecord, Generation, MetaStore};
use chrono::{Local, LocalResult, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Multi-part and common suffixes, longest first
static KNOWN_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.xz", ".docx", ".xlsx", ".java", ".pptx", ".bz2", ".cpp", ".dxf", ".doc",
    ".hpp", ".odp", ".odt", ".ods", ".pdf", ".ppt", ".rar", ".txt", ".tmp", ".wps", ".xls",
    ".zip", ".bz", ".cc", ".py", ".xz", ".c", ".h",
];

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Slot the content came from
    pub slot: usize,
    /// Timestamp of the restored generation
    pub timestamp: i64,
    /// Where the content was written
    pub destination: PathBuf,
    /// Bytes copied
    pub bytes: u64,
}

/// Newest occupied generation of `record`
pub fn pick(record: &BackupRecord) -> Result<(usize, &Generation)> {
    record
        .latest()
        .ok_or_else(|| TribakError::NothingToRestore(record.file_path.clone()))
}

/// Split a file name into stem and extension
///
/// Known suffixes are matched case-insensitively, longest first. Otherwise
/// the extension runs from the last `.`. A leading dot alone (`.bashrc`)
/// does not start an extension. The returned extension keeps its original
/// case.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    let lower = file_name.to_lowercase();
    if lower.len() == file_name.len() {
        for ext in KNOWN_EXTENSIONS {
            if lower.ends_with(ext) && lower.len() > ext.len() {
                let at = file_name.len() - ext.len();
                return (&file_name[..at], &file_name[at..]);
            }
        }
    }

    match file_name.rfind('.') {
        Some(at) if at > 0 => (&file_name[..at], &file_name[at..]),
        _ => (file_name, ""),
    }
}

/// Fixed-width `YYYYMMDDhhmmss` rendering of `timestamp` in local time
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            dt.format(TIMESTAMP_FORMAT).to_string()
        }
        LocalResult::None => format!("{:014}", 0),
    }
}

/// Destination for restoring `generation` of `record`
pub fn restore_destination(record: &BackupRecord, generation: &Generation) -> PathBuf {
    let (dir, file_name) = match record.file_path.rfind('/') {
        Some(at) => record.file_path.split_at(at + 1),
        None => ("", record.file_path.as_str()),
    };
    let (stem, ext) = split_extension(file_name);

    PathBuf::from(format!(
        "{}{}-{}{}",
        dir,
        stem,
        format_timestamp(generation.timestamp),
        ext
    ))
}

/// Copies the newest generation of a record back next to the tracked file
#[derive(Debug)]
pub struct Restorer<'a> {
    store: &'a MetaStore,
    copier: &'a dyn FileCopier,
}

impl<'a> Restorer<'a> {
    /// Restorer reading from `store` and copying with `copier`
    pub fn new(store: &'a MetaStore, copier: &'a dyn FileCopier) -> Self {
        Self { store, copier }
    }

    /// Restore the newest generation of `record`
    ///
    /// # Errors
    ///
    /// - [`TribakError::NothingToRestore`] if no slot is occupied
    /// - [`TribakError::MissingGeneration`] if the data file is gone
    /// - [`TribakError::CopyFailed`] if copying fails
    pub fn restore(&self, record: &BackupRecord) -> Result<RestoreResult> {
        let (slot, generation) = pick(record)?;

        let source = self.store.generation_path(&record.path_hash, slot);
        if !source.is_file() {
            return Err(TribakError::MissingGeneration { slot, path: source });
        }

        let destination = restore_destination(record, generation);
        let bytes = self.copier.copy(&source, &destination)?;

        info!(
            "Restored generation {} of {} to {:?}",
            slot, record.file_path, destination
        );

        Ok(RestoreResult {
            slot,
            timestamp: generation.timestamp,
            destination,
            bytes,
        })
    }
}
