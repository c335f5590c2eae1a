//! # tribak - three-generation file backups
//!
//! Keeps up to three distinct prior versions of individual files on the same
//! volume as the file itself, and restores the newest one on request.
//!
//! ## Overview
//!
//! Each backup call hashes the file's content and compares it with the most
//! recent retained generation:
//! - unchanged content is a no-op
//! - new content fills the next free slot (G1, then G2, then G3)
//! - with all three slots taken, the oldest generation is evicted and the
//!   rest move down one slot
//!
//! Restores never overwrite the tracked file. The newest generation is copied
//! beside it as `<stem>-<YYYYMMDDhhmmss><ext>`.
//!
//! ## On-disk layout
//!
//! ```text
//! <mount>/.tribak/meta/<pathHash>       # text record, fields joined by "{]"
//! <mount>/.tribak/backup/<pathHash>-1   # oldest generation
//! <mount>/.tribak/backup/<pathHash>-2
//! <mount>/.tribak/backup/<pathHash>-3
//! ```
//!
//! `<mount>` is the deepest mount point containing the file, so backups
//! never cross volumes. `<pathHash>` is the MD5 of the normalized path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tribak::{Tribak, Transition};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tribak = Tribak::new();
//!
//! let outcome = tribak.backup("/home/user/report.pdf")?;
//! match outcome.transition {
//!     Transition::Unchanged { .. } => println!("nothing new"),
//!     Transition::Grow { slot } => println!("stored generation {}", slot),
//!     Transition::Rotate => println!("oldest generation evicted"),
//! }
//!
//! let restored = tribak.restore("/home/user/report.pdf")?;
//! println!("restored to {}", restored.destination.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom configuration
//!
//! ```rust,no_run
//! use tribak::TribakBuilder;
//! use tribak::mount::StaticMounts;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tribak = TribakBuilder::new()
//!     .root_marker("my-backups")
//!     .chunk_size(64 * 1024)
//!     .mount_source(StaticMounts::from_mount_points(["/", "/srv"]))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, TribakError>`. [`TribakError::kind`]
//! groups errors into path, I/O, format and configuration problems. A
//! corrupted meta record does not fail a backup: it is logged and the file
//! starts a fresh history.
//!
//! ## Module Organization
//!
//! - [`path`]: path string normalization
//! - [`mount`]: mount table reading and mount point resolution
//! - [`hash`]: path and content digests
//! - [`meta`]: meta records and their store
//! - [`rotation`]: the generation state machine
//! - [`restore`]: restore destination naming and copying back
//! - [`copy`]: metadata-preserving copy
//! - [`types`]: configuration, results, clock
//! - [`error`]: error types

pub mod copy;
pub mod error;
pub mod hash;
pub mod meta;
pub mod mount;
pub mod path;
pub mod restore;
pub mod rotation;
pub mod tribak;
pub mod types;

pub use copy::{FileCopier, MetadataCopier};
pub use error::{ErrorKind, Result, TribakError};
pub use meta::{BackupRecord, Generation, MetaStore};
pub use mount::{MountEntry, MountSource, StaticMounts, SystemMounts};
pub use restore::RestoreResult;
pub use rotation::{Occupancy, Transition};
pub use tribak::{Tribak, TribakBuilder};
pub use types::{BackupOutcome, Clock, SystemClock, TribakConfig};
