//! Path canonicalization
//!
//! Backups are keyed by a hash of the path string, so two spellings of the
//! same file (`/home//a.txt` and `/home/a.txt`) must hash identically. This
//! module only cleans up separators; it never touches the filesystem and
//! does not resolve `.`/`..` or symbolic links.

use crate::error::{Result, TribakError};
use std::path::Path;

const SEPARATOR: char = '/';

/// Collapse repeated separators and strip a trailing separator
///
/// The root path `/` is kept as-is. Normalizing an already normalized path
/// returns it unchanged.
///
/// # Example
///
/// ```rust
/// use tribak::path::normalize_path;
///
/// assert_eq!(normalize_path("a//b///c/"), "a/b/c");
/// assert_eq!(normalize_path("//"), "/");
/// ```
pub fn normalize_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut previous_was_separator = false;

    for ch in raw.chars() {
        if ch == SEPARATOR {
            if previous_was_separator {
                continue;
            }
            previous_was_separator = true;
        } else {
            previous_was_separator = false;
        }
        out.push(ch);
    }

    if out.len() > 1 && out.ends_with(SEPARATOR) {
        out.pop();
    }

    out
}

/// Normalize a [`Path`] into an owned UTF-8 string
///
/// Fails for paths that are not valid UTF-8, since the path string is
/// both hashed and written into the meta record.
pub fn normalize(path: &Path) -> Result<String> {
    let raw = path
        .to_str()
        .ok_or_else(|| TribakError::PathConversion(path.as_os_str().to_owned()))?;
    Ok(normalize_path(raw))
}

/// Check that a canonical path is usable for mount resolution
pub fn require_absolute(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TribakError::EmptyPath);
    }
    if !path.starts_with(SEPARATOR) {
        return Err(TribakError::NotAbsolute(path.to_string()));
    }
    Ok(())
}
