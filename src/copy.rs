//! Metadata-preserving file copy
//!
//! Generation files are copies of the tracked file, and restored files are
//! copies of a generation file. In both directions the copy should look like
//! the original: same content, same mode, and where the process is allowed
//! to, the same owner and group.

use crate::error::{Result, TribakError};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, trace};

/// Copy capability used for both backup and restore
///
/// Implementations must copy content, overwrite `dst` if it exists, and
/// carry over owner, group and mode when the platform allows it.
pub trait FileCopier: Send + Sync + fmt::Debug {
    /// Copy `src` to `dst`, returning the number of bytes copied
    fn copy(&self, src: &Path, dst: &Path) -> Result<u64>;
}

/// Default copier built on `std::fs::copy`
#[derive(Debug, Clone)]
pub struct MetadataCopier {
    preserve_ownership: bool,
}

impl MetadataCopier {
    /// Create a copier; `preserve_ownership` controls the chown step
    pub fn new(preserve_ownership: bool) -> Self {
        Self { preserve_ownership }
    }
}

impl Default for MetadataCopier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FileCopier for MetadataCopier {
    fn copy(&self, src: &Path, dst: &Path) -> Result<u64> {
        let copy_failed = |source: io::Error| TribakError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(src).map_err(copy_failed)?;

        // A read-only destination cannot be opened for writing, replace it instead
        match fs::remove_file(dst) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(copy_failed(e)),
        }

        let bytes = fs::copy(src, dst).map_err(copy_failed)?;

        fs::set_permissions(dst, metadata.permissions()).map_err(copy_failed)?;

        if self.preserve_ownership {
            copy_ownership(&metadata, dst).map_err(copy_failed)?;
        }

        trace!("Copied {} bytes from {:?} to {:?}", bytes, src, dst);
        Ok(bytes)
    }
}

#[cfg(unix)]
fn copy_ownership(metadata: &fs::Metadata, dst: &Path) -> io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    match std::os::unix::fs::chown(dst, Some(metadata.uid()), Some(metadata.gid())) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Not permitted to change owner of {:?}, keeping current owner", dst);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn copy_ownership(_metadata: &fs::Metadata, _dst: &Path) -> io::Result<()> {
    Ok(())
}
