// Link/unlink behavior against a real (temporary) prefix tree.

use fastbrew::symlink::{link_keg, link_keg_dry_run, linked_version, unlink_keg};
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn make_keg(prefix: &Path, name: &str, version: &str, binaries: &[&str]) -> PathBuf {
    let keg = prefix.join("Cellar").join(name).join(version);

    let bin = keg.join("bin");
    fs::create_dir_all(&bin).unwrap();
    for binary in binaries {
        fs::write(bin.join(binary), "#!/bin/sh\necho test\n").unwrap();
    }

    let man = keg.join("share").join("man").join("man1");
    fs::create_dir_all(&man).unwrap();
    fs::write(man.join(format!("{name}.1")), "man page").unwrap();

    keg
}

fn snapshot(prefix: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    collect(prefix, &mut paths);
    paths.sort();
    paths
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        out.push(path.clone());
        if path.is_dir() && !path.is_symlink() {
            collect(&path, out);
        }
    }
}

#[test]
fn test_link_creates_mirror_and_opt() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool"]);

    let result = link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();
    assert!(result.success());
    assert_eq!(result.links.len(), 2); // bin/tool + the man page

    let tool = prefix.join("bin").join("tool");
    assert!(tool.symlink_metadata().unwrap().is_symlink());
    assert!(prefix.join("share/man/man1/testpkg.1").is_symlink());

    // Every link's target resolves into the keg.
    let target = fs::read_link(&tool).unwrap();
    assert!(target.starts_with(cellar.join("testpkg")));

    assert_eq!(
        linked_version(prefix, "testpkg").as_deref(),
        Some("1.0.0")
    );
}

#[test]
fn test_dry_run_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool"]);
    let before = snapshot(prefix);

    let result = link_keg_dry_run(prefix, &cellar, "testpkg", "1.0.0").unwrap();
    assert_eq!(result.links.len(), 2);
    assert_eq!(snapshot(prefix), before);
    assert!(!prefix.join("bin").exists());
    assert!(!prefix.join("opt").exists());
}

#[test]
fn test_link_then_unlink_restores_prefix() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool", "helper"]);

    // Pre-create the shared dirs so the snapshot comparison only sees
    // the links themselves come and go.
    fs::create_dir_all(prefix.join("bin")).unwrap();
    fs::create_dir_all(prefix.join("share/man/man1")).unwrap();
    fs::create_dir_all(prefix.join("opt")).unwrap();
    let before = snapshot(prefix);

    link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();
    let removed = unlink_keg(prefix, &cellar, "testpkg").unwrap();

    // opt link + 2 binaries + man page.
    assert_eq!(removed.len(), 4);
    assert_eq!(snapshot(prefix), before);
}

#[test]
fn test_unlink_leaves_foreign_links_alone() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "mine", "1.0.0", &["shared-name"]);
    make_keg(prefix, "other", "2.0.0", &["shared-name"]);

    // Link "other" first so it owns bin/shared-name.
    link_keg(prefix, &cellar, "other", "2.0.0").unwrap();
    let owner_target = fs::read_link(prefix.join("bin/shared-name")).unwrap();
    assert!(owner_target.starts_with(cellar.join("other")));

    // Unlinking "mine" must not remove a link it doesn't own.
    let removed = unlink_keg(prefix, &cellar, "mine").unwrap();
    assert!(removed.iter().all(|p| !p.ends_with("bin/shared-name")));
    assert!(prefix.join("bin/shared-name").is_symlink());
}

#[test]
fn test_relink_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool"]);

    link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();
    let before = snapshot(prefix);
    let result = link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();

    assert!(result.success());
    assert_eq!(snapshot(prefix), before);
}

#[test]
fn test_link_new_version_repoints_opt() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool"]);
    make_keg(prefix, "testpkg", "2.0.0", &["tool"]);

    link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();
    assert_eq!(linked_version(prefix, "testpkg").as_deref(), Some("1.0.0"));

    link_keg(prefix, &cellar, "testpkg", "2.0.0").unwrap();
    assert_eq!(linked_version(prefix, "testpkg").as_deref(), Some("2.0.0"));

    let target = fs::read_link(prefix.join("bin/tool")).unwrap();
    assert!(target.starts_with(cellar.join("testpkg/2.0.0")));
}

#[test]
fn test_regular_file_survives_link() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");
    make_keg(prefix, "testpkg", "1.0.0", &["tool"]);

    // A real file (not a symlink) already sits at the destination.
    fs::create_dir_all(prefix.join("bin")).unwrap();
    fs::write(prefix.join("bin/tool"), "user data").unwrap();

    link_keg(prefix, &cellar, "testpkg", "1.0.0").unwrap();

    let meta = fs::symlink_metadata(prefix.join("bin/tool")).unwrap();
    assert!(!meta.is_symlink());
    assert_eq!(fs::read_to_string(prefix.join("bin/tool")).unwrap(), "user data");
}

#[test]
fn test_unlink_after_keg_deleted_still_removes_links() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path();
    let cellar = prefix.join("Cellar");

    // Simulate a keg removed behind our back, leaving dangling links.
    fs::create_dir_all(prefix.join("bin")).unwrap();
    fs::create_dir_all(prefix.join("opt")).unwrap();
    unix_fs::symlink(
        cellar.join("ghost/1.0.0/bin/ghost"),
        prefix.join("bin/ghost"),
    )
    .unwrap();
    unix_fs::symlink(cellar.join("ghost/1.0.0"), prefix.join("opt/ghost")).unwrap();

    // The keg dir is gone, so only the opt link (pointing into the keg
    // path) can be attributed and removed.
    let removed = unlink_keg(prefix, &cellar, "ghost").unwrap();
    assert_eq!(removed, vec![prefix.join("opt/ghost")]);
}
