//! Integration tests for backup and restore
//!
//! Runs the full pipeline (normalize, resolve mount, hash, rotate, persist)
//! against a temporary directory standing in for a mounted volume.

use ::tribak::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tempfile::TempDir;

/// First generation timestamp used by [`StepClock`]: 2025-01-11 12:00:00 UTC
pub const BASE_TIME: i64 = 1_736_596_800;

/// Clock that advances one minute per reading
#[derive(Debug, Default)]
pub struct StepClock(AtomicI64);

impl Clock for StepClock {
    fn now(&self) -> i64 {
        BASE_TIME + self.0.fetch_add(60, Ordering::SeqCst)
    }
}

/// Temporary volume with a tribak instance bound to it
pub struct TribakTestHarness {
    pub volume: TempDir,
    pub tribak: Tribak,
}

impl TribakTestHarness {
    /// Create a new test harness
    pub fn new() -> Self {
        let volume = TempDir::new().unwrap();
        let tribak = TribakBuilder::new()
            .mount_source(StaticMounts::from_mount_points([
                "/".to_string(),
                volume.path().to_str().unwrap().to_string(),
            ]))
            .clock(StepClock::default())
            .build()
            .unwrap();

        Self { volume, tribak }
    }

    /// Absolute path of `name` on the volume
    pub fn path(&self, name: &str) -> PathBuf {
        self.volume.path().join(name)
    }

    /// Write `content` to `name` and back it up
    pub fn write_and_backup(&self, name: &str, content: &[u8]) -> anyhow::Result<BackupOutcome> {
        let path = self.path(name);
        fs::write(&path, content)?;
        Ok(self.tribak.backup(&path)?)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.volume.path().join(".tribak").join("backup")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.volume.path().join(".tribak").join("meta")
    }

    /// Data file for generation `slot` of `name`
    pub fn generation_file(&self, name: &str, slot: usize) -> PathBuf {
        let hash = hash::hash_path(self.path(name).to_str().unwrap());
        self.backup_dir().join(format!("{}-{}", hash, slot))
    }

    pub fn meta_file(&self, name: &str) -> PathBuf {
        self.meta_dir()
            .join(hash::hash_path(self.path(name).to_str().unwrap()))
    }

    pub fn data_file_count(&self) -> usize {
        count_entries(&self.backup_dir())
    }
}

fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_backup_then_identical_is_noop() {
        let harness = TribakTestHarness::new();

        let first = harness.write_and_backup("notes.txt", b"hello").unwrap();
        assert_eq!(first.transition, Transition::Grow { slot: 1 });
        assert_eq!(first.record.occupied(), 1);
        assert_eq!(harness.data_file_count(), 1);
        assert_eq!(fs::read(harness.generation_file("notes.txt", 1)).unwrap(), b"hello");

        let meta_before = fs::read_to_string(harness.meta_file("notes.txt")).unwrap();

        let second = harness.write_and_backup("notes.txt", b"hello").unwrap();
        assert_eq!(second.transition, Transition::Unchanged { slot: 1 });
        assert_eq!(harness.data_file_count(), 1);
        assert_eq!(
            fs::read_to_string(harness.meta_file("notes.txt")).unwrap(),
            meta_before
        );
    }

    #[test]
    fn test_four_versions_evict_oldest() {
        let harness = TribakTestHarness::new();

        let transitions: Vec<Transition> = [b"A", b"B", b"C", b"D"]
            .iter()
            .map(|content| {
                harness
                    .write_and_backup("doc.txt", *content)
                    .unwrap()
                    .transition
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Grow { slot: 1 },
                Transition::Grow { slot: 2 },
                Transition::Grow { slot: 3 },
                Transition::Rotate,
            ]
        );

        assert_eq!(fs::read(harness.generation_file("doc.txt", 1)).unwrap(), b"B");
        assert_eq!(fs::read(harness.generation_file("doc.txt", 2)).unwrap(), b"C");
        assert_eq!(fs::read(harness.generation_file("doc.txt", 3)).unwrap(), b"D");
        assert_eq!(harness.data_file_count(), 3);

        let record = harness.tribak.record(harness.path("doc.txt")).unwrap().unwrap();
        let timestamps: Vec<i64> = record
            .slots
            .iter()
            .map(|s| s.as_ref().unwrap().timestamp)
            .collect();
        assert_eq!(timestamps, vec![BASE_TIME + 60, BASE_TIME + 120, BASE_TIME + 180]);

        let restored = harness.tribak.restore(harness.path("doc.txt")).unwrap();
        assert_eq!(restored.slot, 3);
        assert_eq!(fs::read(&restored.destination).unwrap(), b"D");
    }

    #[test]
    fn test_restore_single_generation_keeps_extension() {
        let harness = TribakTestHarness::new();
        harness.write_and_backup("report.pdf", b"%PDF-1.7").unwrap();

        let restored = harness.tribak.restore(harness.path("report.pdf")).unwrap();
        assert_eq!(restored.slot, 1);
        assert_eq!(restored.timestamp, BASE_TIME);
        assert_eq!(
            restored.destination,
            harness.path(&format!(
                "report-{}.pdf",
                restore::format_timestamp(BASE_TIME)
            ))
        );
        assert_eq!(fs::read(&restored.destination).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn test_no_mount_creates_nothing() {
        let volume = TempDir::new().unwrap();
        let tribak = TribakBuilder::new()
            .mount_source(StaticMounts::default())
            .build()
            .unwrap();

        let file = volume.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let err = tribak.backup(&file).unwrap_err();
        assert!(matches!(err, TribakError::NoMountPoint(_)));
        assert_eq!(err.kind(), ErrorKind::Path);
        assert_eq!(count_entries(volume.path()), 1);
    }

    #[test]
    fn test_reverting_content_counts_as_new() {
        let harness = TribakTestHarness::new();

        for content in [b"A", b"B", b"A"] {
            harness.write_and_backup("flip.txt", content).unwrap();
        }

        let record = harness.tribak.record(harness.path("flip.txt")).unwrap().unwrap();
        assert_eq!(record.occupied(), 3);
        assert_eq!(
            record.slots[0].as_ref().unwrap().content_hash,
            record.slots[2].as_ref().unwrap().content_hash
        );

        // A fourth distinct write evicts the first "A" even though "A" is still retained
        let outcome = harness.write_and_backup("flip.txt", b"C").unwrap();
        assert_eq!(outcome.transition, Transition::Rotate);
        assert_eq!(fs::read(harness.generation_file("flip.txt", 1)).unwrap(), b"B");
        assert_eq!(fs::read(harness.generation_file("flip.txt", 2)).unwrap(), b"A");
    }

    #[test]
    fn test_corrupt_meta_starts_fresh_history() {
        let harness = TribakTestHarness::new();
        harness.write_and_backup("c.txt", b"one").unwrap();
        harness.write_and_backup("c.txt", b"two").unwrap();

        fs::write(harness.meta_file("c.txt"), "1{]half a record").unwrap();
        assert!(harness
            .tribak
            .record(harness.path("c.txt"))
            .unwrap_err()
            .is_format());

        let outcome = harness.write_and_backup("c.txt", b"three").unwrap();
        assert_eq!(outcome.transition, Transition::Grow { slot: 1 });
        assert_eq!(fs::read(harness.generation_file("c.txt", 1)).unwrap(), b"three");

        let record = harness.tribak.record(harness.path("c.txt")).unwrap().unwrap();
        assert_eq!(record.occupied(), 1);
    }

    #[test]
    fn test_unknown_version_starts_fresh_history() {
        let harness = TribakTestHarness::new();
        harness.write_and_backup("v.txt", b"one").unwrap();

        let hash = hash::hash_path(harness.path("v.txt").to_str().unwrap());
        fs::write(
            harness.meta_file("v.txt"),
            format!("9{{]/x{{]{}{{]0", hash),
        )
        .unwrap();

        let outcome = harness.write_and_backup("v.txt", b"one").unwrap();
        assert_eq!(outcome.transition, Transition::Grow { slot: 1 });
    }

    #[test]
    fn test_upload_flag_survives_rewrites() {
        let harness = TribakTestHarness::new();
        let first = harness.write_and_backup("u.txt", b"one").unwrap();

        let mut record = first.record.clone();
        record.upload_flag = true;
        let store = MetaStore::new(harness.volume.path(), "tribak");
        store.save(&record).unwrap();

        let outcome = harness.write_and_backup("u.txt", b"two").unwrap();
        assert!(outcome.record.upload_flag);
        assert!(harness.tribak.record(harness.path("u.txt")).unwrap().unwrap().upload_flag);
    }

    #[derive(Debug)]
    struct BrokenCopier;

    impl FileCopier for BrokenCopier {
        fn copy(&self, src: &Path, dst: &Path) -> Result<u64> {
            Err(TribakError::CopyFailed {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "no space left on device"),
            })
        }
    }

    #[test]
    fn test_copy_failure_leaves_state_unchanged() {
        let harness = TribakTestHarness::new();
        harness.write_and_backup("f.txt", b"one").unwrap();
        let meta_before = fs::read_to_string(harness.meta_file("f.txt")).unwrap();

        let broken = TribakBuilder::new()
            .mount_source(StaticMounts::from_mount_points([harness
                .volume
                .path()
                .to_str()
                .unwrap()
                .to_string()]))
            .copier(BrokenCopier)
            .build()
            .unwrap();

        fs::write(harness.path("f.txt"), b"two").unwrap();
        let err = broken.backup(harness.path("f.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        assert_eq!(
            fs::read_to_string(harness.meta_file("f.txt")).unwrap(),
            meta_before
        );
        assert_eq!(harness.data_file_count(), 1);
        assert_eq!(fs::read(harness.generation_file("f.txt", 1)).unwrap(), b"one");
    }

    #[test]
    fn test_missing_generation_file_on_restore() {
        let harness = TribakTestHarness::new();
        harness.write_and_backup("m.txt", b"one").unwrap();
        fs::remove_file(harness.generation_file("m.txt", 1)).unwrap();

        let err = harness.tribak.restore(harness.path("m.txt")).unwrap_err();
        assert!(matches!(err, TribakError::MissingGeneration { slot: 1, .. }));
    }

    #[test]
    fn test_delimiter_in_file_name_is_rejected() {
        let harness = TribakTestHarness::new();

        for content in [b"A", b"B", b"C"] {
            let err = harness
                .write_and_backup("odd{]name.txt", content)
                .unwrap_err()
                .downcast::<TribakError>()
                .unwrap();
            assert!(matches!(err, TribakError::UnencodablePath(_)));
            assert_eq!(err.kind(), ErrorKind::Path);
        }

        assert_eq!(harness.data_file_count(), 0);
        assert!(!harness.meta_dir().exists());

        // Other files on the volume are unaffected
        harness.write_and_backup("plain.txt", b"A").unwrap();
        harness.write_and_backup("plain.txt", b"B").unwrap();
        let record = harness.tribak.record(harness.path("plain.txt")).unwrap().unwrap();
        assert_eq!(record.occupied(), 2);
    }

    #[test]
    fn test_missing_generation_blocks_rotation() {
        let harness = TribakTestHarness::new();
        for content in [b"A", b"B", b"C"] {
            harness.write_and_backup("r.txt", content).unwrap();
        }
        let meta_before = fs::read_to_string(harness.meta_file("r.txt")).unwrap();
        fs::remove_file(harness.generation_file("r.txt", 2)).unwrap();

        let err = harness
            .write_and_backup("r.txt", b"D")
            .unwrap_err()
            .downcast::<TribakError>()
            .unwrap();
        assert!(matches!(err, TribakError::MissingGeneration { slot: 2, .. }));

        // The surviving generations stay where they were
        assert_eq!(fs::read(harness.generation_file("r.txt", 1)).unwrap(), b"A");
        assert_eq!(fs::read(harness.generation_file("r.txt", 3)).unwrap(), b"C");
        assert_eq!(harness.data_file_count(), 2);
        assert_eq!(
            fs::read_to_string(harness.meta_file("r.txt")).unwrap(),
            meta_before
        );
    }

    #[test]
    fn test_concurrent_backups_of_one_path() {
        let harness = TribakTestHarness::new();
        let file = harness.path("shared.txt");
        fs::write(&file, b"same content").unwrap();

        let tribak = Arc::new(harness.tribak);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tribak = Arc::clone(&tribak);
                let file = file.clone();
                thread::spawn(move || tribak.backup(&file).unwrap().transition)
            })
            .collect();

        let transitions: Vec<Transition> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let grown = transitions.iter().filter(|t| !t.is_noop()).count();
        assert_eq!(grown, 1);

        let record = tribak.record(&file).unwrap().unwrap();
        assert_eq!(record.occupied(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let harness = TribakTestHarness::new();
        let file = harness.path("run.sh");
        fs::write(&file, b"#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o754)).unwrap();

        harness.tribak.backup(&file).unwrap();
        let mode = fs::metadata(harness.generation_file("run.sh", 1))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o754);

        let restored = harness.tribak.restore(&file).unwrap();
        let mode = fs::metadata(&restored.destination).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o754);
    }
}
