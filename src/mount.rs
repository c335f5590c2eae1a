//! Mount point resolution
//!
//! Backups live on the same volume as the file they protect, under the
//! volume's mount point. This module reads the system mount table and picks
//! the deepest mount point that contains a given path.
//!
//! ## Mount table format
//!
//! ```text
//! /dev/sda1 / ext4 rw,relatime 0 0
//! /dev/sdb1 /home ext4 rw,relatime 0 0
//! tmpfs /tmp tmpfs rw 0 0
//! ```
//!
//! Only entries whose device is an absolute path are considered, which
//! filters out pseudo filesystems such as `proc`, `tmpfs` or `sysfs`.

use crate::error::{Result, TribakError};
use crate::path::require_absolute;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, trace};

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Device or source, e.g. `/dev/sda1`
    pub device: String,
    /// Directory the device is mounted on
    pub mount_point: String,
    /// Filesystem type, e.g. `ext4`
    pub fs_type: String,
}

impl MountEntry {
    /// Create an entry
    pub fn new(
        device: impl Into<String>,
        mount_point: impl Into<String>,
        fs_type: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
        }
    }
}

/// Source of mount table entries
pub trait MountSource: Send + Sync + fmt::Debug {
    /// Read the current mount table
    fn entries(&self) -> Result<Vec<MountEntry>>;
}

/// Mount table read from the running system
#[derive(Debug, Clone)]
pub struct SystemMounts {
    tables: Vec<PathBuf>,
}

impl SystemMounts {
    /// Read from the first readable file among `tables`
    pub fn new(tables: Vec<PathBuf>) -> Self {
        Self { tables }
    }
}

impl Default for SystemMounts {
    fn default() -> Self {
        Self::new(default_mount_tables())
    }
}

/// Mount tables tried in order by [`SystemMounts::default`]
pub fn default_mount_tables() -> Vec<PathBuf> {
    vec![PathBuf::from("/etc/mtab"), PathBuf::from("/proc/mounts")]
}

impl MountSource for SystemMounts {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        let mut last_err = None;
        for table in &self.tables {
            match fs::read_to_string(table) {
                Ok(text) => {
                    trace!("Read mount table {:?}", table);
                    return Ok(parse_mount_table(&text));
                }
                Err(e) => {
                    debug!("Mount table {:?} unreadable: {}", table, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(TribakError::Io)
            .unwrap_or_else(|| TribakError::config("no mount table configured")))
    }
}

/// Fixed, in-memory mount table
#[derive(Debug, Clone, Default)]
pub struct StaticMounts {
    entries: Vec<MountEntry>,
}

impl StaticMounts {
    /// Use exactly these entries
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Build a table from bare mount points, each backed by a fake block device
    pub fn from_mount_points<I, S>(mount_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = mount_points
            .into_iter()
            .enumerate()
            .map(|(i, mp)| MountEntry::new(format!("/dev/static{}", i), mp, "static"))
            .collect();
        Self { entries }
    }
}

impl MountSource for StaticMounts {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        Ok(self.entries.clone())
    }
}

/// Parse mount table text (`/etc/mtab` or `/proc/mounts` layout)
///
/// Lines that do not start with `/` or have fewer than three fields are
/// skipped. Tabs count as separators and octal escapes (`\040`) in the
/// mount point are decoded.
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter(|line| line.starts_with('/'))
        .filter_map(|line| {
            let mut fields = line.split([' ', '\t']).filter(|f| !f.is_empty());
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry::new(
                unescape_octal(device),
                unescape_octal(mount_point),
                fs_type,
            ))
        })
        .collect()
}

/// Decode `\NNN` octal escapes the kernel uses for whitespace in paths
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// List mount points backed by a real device, deepest first
///
/// Sorting by descending length guarantees that a prefix search finds
/// `/home/user` before `/home` before `/`.
pub fn list_mount_points(source: &dyn MountSource) -> Result<Vec<String>> {
    let mut mount_points: Vec<String> = source
        .entries()?
        .into_iter()
        .filter(|e| e.device.starts_with('/') && !e.mount_point.is_empty())
        .map(|e| e.mount_point)
        .collect();

    mount_points.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    mount_points.dedup();

    Ok(mount_points)
}

/// Find the mount point holding `path`
///
/// `path` must already be normalized. The mount table is read on every call.
pub fn resolve_mount_point(path: &str, source: &dyn MountSource) -> Result<String> {
    require_absolute(path)?;

    let mount_point = list_mount_points(source)?
        .into_iter()
        .find(|mp| is_under(path, mp))
        .ok_or_else(|| TribakError::NoMountPoint(path.to_string()))?;

    debug!("Resolved {} to mount point {}", path, mount_point);
    Ok(mount_point)
}

/// Prefix match that respects path component boundaries
fn is_under(path: &str, mount_point: &str) -> bool {
    if mount_point == "/" {
        return true;
    }
    match path.strip_prefix(mount_point.trim_end_matches('/')) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
