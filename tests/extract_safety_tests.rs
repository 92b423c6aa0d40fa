// Archive extraction: format detection and the safety rules that keep
// hostile bottles inside the extraction root.

use fastbrew::error::FastBrewError;
use fastbrew::extract::extract_bottle;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct ArchiveBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    fn file(mut self, path: &str, content: &str, mode: u32) -> Self {
        let mut header = tar::Header::new_gnu();
        // Written directly into the raw name bytes (rather than via
        // `set_path`/`append_data`) so traversal fixtures like `../..`
        // aren't rejected before the entry ever reaches the archive.
        let name_field = &mut header.as_mut_bytes()[0..100];
        name_field[..path.len()].copy_from_slice(path.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        self.builder.append(&header, content.as_bytes()).unwrap();
        self
    }

    fn symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        self.builder
            .append_link(&mut header, path, target)
            .unwrap();
        self
    }

    fn char_device(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Char);
        header.set_size(0);
        header.set_device_major(1).unwrap();
        header.set_device_minor(3).unwrap();
        header.set_path(path).unwrap();
        header.set_cksum();
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }

    fn gz(self, path: &Path) {
        let tar_bytes = self.builder.into_inner().unwrap();
        let file = fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        encoder.finish().unwrap();
    }

    fn zst(self, path: &Path) {
        let tar_bytes = self.builder.into_inner().unwrap();
        let compressed = zstd::encode_all(&tar_bytes[..], 3).unwrap();
        fs::write(path, compressed).unwrap();
    }
}

fn roots(dir: &TempDir) -> (PathBuf, PathBuf) {
    let prefix = dir.path().join("prefix");
    let cellar = prefix.join("Cellar");
    fs::create_dir_all(&cellar).unwrap();
    (prefix, cellar)
}

#[test]
fn test_extracts_gzip_bottle() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    ArchiveBuilder::new()
        .file("pkg/1.0/bin/tool", "#!/bin/sh\necho hi\n", 0o755)
        .file("pkg/1.0/README", "docs", 0o644)
        .gz(&archive);

    extract_bottle(&archive, &cellar, &prefix).unwrap();

    let tool = cellar.join("pkg/1.0/bin/tool");
    assert!(tool.is_file());
    assert_eq!(
        fs::metadata(&tool).unwrap().permissions().mode() & 0o777,
        0o755
    );
    assert!(cellar.join("pkg/1.0/README").is_file());
}

#[test]
fn test_extracts_zstd_bottle() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    ArchiveBuilder::new()
        .file("pkg/1.0/bin/tool", "#!/bin/sh\n", 0o755)
        .zst(&archive);

    extract_bottle(&archive, &cellar, &prefix).unwrap();
    assert!(cellar.join("pkg/1.0/bin/tool").is_file());
}

#[test]
fn test_rejects_path_traversal() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("evil.bottle");

    ArchiveBuilder::new()
        .file("pkg/../../escape.txt", "pwned", 0o644)
        .gz(&archive);

    let err = extract_bottle(&archive, &cellar, &prefix).unwrap_err();
    assert!(matches!(err, FastBrewError::ExtractionUnsafe(_)));
    assert!(!dir.path().join("escape.txt").exists());
}

#[test]
fn test_rejects_symlink_escaping_roots() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("evil.bottle");

    ArchiveBuilder::new()
        .symlink("pkg/1.0/bin/evil", "/etc/passwd")
        .gz(&archive);

    let err = extract_bottle(&archive, &cellar, &prefix).unwrap_err();
    assert!(matches!(err, FastBrewError::ExtractionUnsafe(_)));
}

#[test]
fn test_accepts_relative_symlink_inside_keg() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    ArchiveBuilder::new()
        .file("pkg/1.0/lib/libreal.so", "bits", 0o644)
        .symlink("pkg/1.0/lib/libalias.so", "libreal.so")
        .gz(&archive);

    extract_bottle(&archive, &cellar, &prefix).unwrap();
    let alias = cellar.join("pkg/1.0/lib/libalias.so");
    assert!(alias.symlink_metadata().unwrap().is_symlink());
    assert_eq!(fs::read_link(&alias).unwrap(), PathBuf::from("libreal.so"));
}

#[test]
fn test_accepts_absolute_symlink_into_prefix() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    let opt_target = prefix.join("opt/dep/bin/real");
    ArchiveBuilder::new()
        .symlink("pkg/1.0/bin/wrapper", opt_target.to_str().unwrap())
        .gz(&archive);

    extract_bottle(&archive, &cellar, &prefix).unwrap();
    assert!(cellar
        .join("pkg/1.0/bin/wrapper")
        .symlink_metadata()
        .unwrap()
        .is_symlink());
}

#[test]
fn test_device_entries_skipped() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    ArchiveBuilder::new()
        .char_device("pkg/1.0/dev/null")
        .file("pkg/1.0/bin/tool", "#!/bin/sh\n", 0o755)
        .gz(&archive);

    // The device entry is skipped with a warning, not an error, and
    // the rest of the archive still extracts.
    extract_bottle(&archive, &cellar, &prefix).unwrap();
    assert!(!cellar.join("pkg/1.0/dev/null").exists());
    assert!(cellar.join("pkg/1.0/bin/tool").is_file());
}

#[test]
fn test_permission_bits_masked() {
    let dir = TempDir::new().unwrap();
    let (prefix, cellar) = roots(&dir);
    let archive = dir.path().join("pkg.bottle");

    // setuid bit must not survive the mask.
    ArchiveBuilder::new()
        .file("pkg/1.0/bin/suid", "#!/bin/sh\n", 0o4755)
        .gz(&archive);

    extract_bottle(&archive, &cellar, &prefix).unwrap();
    let mode = fs::metadata(cellar.join("pkg/1.0/bin/suid"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o755);
}
