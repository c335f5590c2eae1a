//! Path and content digests
//!
//! Both digests are MD5, hex encoded (32 characters). The path digest is an
//! identifier for on-disk names, and the content digest is a change
//! fingerprint; neither is relied on for security. Using the same algorithm
//! as existing meta records keeps stored digests comparable.

use crate::error::{Result, TribakError};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

/// Default read size for content hashing
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Hash a canonical path string
///
/// ```rust
/// use tribak::hash::hash_path;
///
/// let id = hash_path("/home/user/report.pdf");
/// assert_eq!(id.len(), 32);
/// assert_eq!(id, hash_path("/home/user/report.pdf"));
/// ```
pub fn hash_path(path: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a file's content, reading `chunk_size` bytes at a time
///
/// Memory use does not depend on the file size.
///
/// # Errors
///
/// - [`TribakError::HashFailed`] if the file cannot be opened or read
pub fn hash_content(path: &Path, chunk_size: usize) -> Result<String> {
    let file = File::open(path).map_err(|source| TribakError::HashFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = hash_reader(file, chunk_size).map_err(|source| TribakError::HashFailed {
        path: path.to_path_buf(),
        source,
    })?;

    trace!("Content hash of {:?}: {}", path, digest);
    Ok(digest)
}

/// Hash everything readable from `reader`
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
