//! Main test module for tribak
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end backup and restore scenarios
//! - Property-based tests for invariants

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::tribak::*;
    use std::fs;
    use tempfile::TempDir;

    fn tribak_on(volume: &TempDir) -> Tribak {
        TribakBuilder::new()
            .mount_source(StaticMounts::from_mount_points([volume
                .path()
                .to_str()
                .unwrap()
                .to_string()]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_file() {
        let volume = TempDir::new().unwrap();
        let tribak = tribak_on(&volume);

        let file = volume.path().join("empty.txt");
        fs::write(&file, b"").unwrap();

        let outcome = tribak.backup(&file).unwrap();
        assert_eq!(outcome.transition, Transition::Grow { slot: 1 });
        assert_eq!(
            outcome.record.slots[0].as_ref().unwrap().content_hash,
            "d41d8cd98f00b204e9800998ecf8427e"
        );

        let restored = tribak.restore(&file).unwrap();
        assert_eq!(restored.bytes, 0);
        assert!(fs::read(&restored.destination).unwrap().is_empty());
    }

    #[test]
    fn test_special_filenames() {
        let volume = TempDir::new().unwrap();
        let tribak = tribak_on(&volume);

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.docx",
            "file.with.dots.txt",
            "archive.TAR.GZ",
            "no_extension",
            ".hidden",
        ];

        for name in &special_names {
            let path = volume.path().join(name);
            if fs::write(&path, format!("Content of {}", name)).is_err() {
                // Skip if OS doesn't support this filename
                continue;
            }
            tribak.backup(&path).unwrap();
            let restored = tribak.restore(&path).unwrap();
            assert_eq!(
                fs::read_to_string(&restored.destination).unwrap(),
                format!("Content of {}", name)
            );
            assert_eq!(restored.destination.parent(), path.parent());
        }

        let archive = volume.path().join("archive.TAR.GZ");
        let restored = tribak.restore(&archive).unwrap();
        let name = restored.destination.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("archive-"));
        assert!(name.ends_with(".TAR.GZ"));
    }

    #[test]
    fn test_unicode_filenames() {
        let volume = TempDir::new().unwrap();
        let tribak = tribak_on(&volume);

        let unicode_names = vec!["файл.txt", "文件.pdf", "ファイル.odt", "🚀🌟💾.zip"];

        for name in &unicode_names {
            let path = volume.path().join(name);
            if fs::write(&path, format!("Unicode content: {}", name)).is_err() {
                continue;
            }
            tribak.backup(&path).unwrap();
            let record = tribak.record(&path).unwrap().unwrap();
            assert_eq!(record.file_path, path.to_str().unwrap());

            let restored = tribak.restore(&path).unwrap();
            assert_eq!(
                fs::read_to_string(&restored.destination).unwrap(),
                format!("Unicode content: {}", name)
            );
        }
    }

    #[test]
    fn test_large_file_streams() {
        let volume = TempDir::new().unwrap();
        let tribak = TribakBuilder::new()
            .chunk_size(4096)
            .mount_source(StaticMounts::from_mount_points([volume
                .path()
                .to_str()
                .unwrap()
                .to_string()]))
            .build()
            .unwrap();

        let file = volume.path().join("big.bin");
        let data: Vec<u8> = (0..3_000_000u32).map(|i| (i * 31 % 256) as u8).collect();
        fs::write(&file, &data).unwrap();

        tribak.backup(&file).unwrap();
        let restored = tribak.restore(&file).unwrap();
        assert_eq!(restored.bytes, data.len() as u64);
        assert_eq!(fs::read(&restored.destination).unwrap(), data);
    }

    #[test]
    fn test_files_are_independent() {
        let volume = TempDir::new().unwrap();
        let tribak = tribak_on(&volume);

        let a = volume.path().join("a.txt");
        let b = volume.path().join("b.txt");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();

        tribak.backup(&a).unwrap();
        let outcome = tribak.backup(&b).unwrap();

        // Identical content in another file is not shared or skipped
        assert_eq!(outcome.transition, Transition::Grow { slot: 1 });
        assert_eq!(
            fs::read_dir(volume.path().join(".tribak/backup")).unwrap().count(),
            2
        );
    }
}
