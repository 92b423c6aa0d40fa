//! Reclaim old versions, stale cache files and broken symlinks.

use crate::client::Client;
use crate::error::Result;
use crate::resume::RESUME_SUFFIX;
use std::fs;
use std::path::PathBuf;

/// Cache files that survive a sweep: the catalogs, the derived search
/// artifacts and in-flight download sidecars.
const KEEP_CACHE_FILES: &[&str] = &[
    "formula.json.zst",
    "cask.json.zst",
    "search.gob.zst",
    "prefix_index.gob",
];

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed_versions: Vec<(String, String)>,
    pub removed_cache_files: Vec<PathBuf>,
    pub removed_symlinks: Vec<PathBuf>,
}

/// Run the full cleanup: old keg versions, cache sweep, broken links.
pub fn run(client: &Client) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    remove_old_versions(client, &mut report)?;
    sweep_cache(client, &mut report)?;
    remove_broken_symlinks(client, &mut report)?;
    Ok(report)
}

/// For every package with more than one version directory, keep only
/// the lexicographically-last one.
fn remove_old_versions(client: &Client, report: &mut CleanupReport) -> Result<()> {
    let entries = match fs::read_dir(&client.cellar) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let mut versions: Vec<String> = fs::read_dir(entry.path())?
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|v| !v.starts_with('.'))
            .collect();

        if versions.len() <= 1 {
            continue;
        }
        versions.sort();
        let keep = versions.pop().unwrap();
        tracing::debug!(package = name, keep, "removing old versions");

        for version in versions {
            fs::remove_dir_all(entry.path().join(&version))?;
            report.removed_versions.push((name.clone(), version));
        }
    }

    Ok(())
}

/// Remove cached bottles and other leftovers, preserving the catalog,
/// index artifacts and resume sidecars.
fn sweep_cache(client: &Client, report: &mut CleanupReport) -> Result<()> {
    let entries = match fs::read_dir(&client.cache_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if KEEP_CACHE_FILES.contains(&name.as_str()) || name.ends_with(RESUME_SUFFIX) {
            continue;
        }
        fs::remove_file(&path)?;
        report.removed_cache_files.push(path);
    }

    Ok(())
}

/// Walk the link dirs (plus `opt`) and delete symlinks whose targets no
/// longer exist.
fn remove_broken_symlinks(client: &Client, report: &mut CleanupReport) -> Result<()> {
    let mut dirs: Vec<&str> = crate::symlink::LINK_DIRS.to_vec();
    dirs.push("opt");

    for dir in dirs {
        let root = client.prefix.join(dir);
        if root.is_dir() {
            remove_broken_in(&root, report)?;
        }
    }
    Ok(())
}

fn remove_broken_in(dir: &std::path::Path, report: &mut CleanupReport) -> Result<()> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };

        if meta.is_symlink() {
            if fs::metadata(&path).is_err() {
                fs::remove_file(&path)?;
                report.removed_symlinks.push(path);
            }
        } else if meta.is_dir() {
            remove_broken_in(&path, report)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn client_for(dir: &TempDir) -> Client {
        Client::with_paths(dir.path().to_path_buf(), dir.path().join("cache"))
    }

    #[test]
    fn test_old_versions_removed_keeping_last() {
        let dir = TempDir::new().unwrap();
        let client = client_for(&dir);
        for version in ["1.0.0", "1.1.0", "1.2.0"] {
            fs::create_dir_all(client.cellar.join("foo").join(version)).unwrap();
        }

        let report = run(&client).unwrap();
        assert_eq!(report.removed_versions.len(), 2);
        assert!(client.cellar.join("foo/1.2.0").exists());
        assert!(!client.cellar.join("foo/1.0.0").exists());
        assert!(!client.cellar.join("foo/1.1.0").exists());
    }

    #[test]
    fn test_cache_sweep_preserves_catalog_and_sidecars() {
        let dir = TempDir::new().unwrap();
        let client = client_for(&dir);
        fs::create_dir_all(&client.cache_dir).unwrap();

        for keep in [
            "formula.json.zst",
            "cask.json.zst",
            "search.gob.zst",
            "prefix_index.gob",
            "wget-1.25.0.bottle.fastbrew-resume",
        ] {
            fs::write(client.cache_dir.join(keep), b"x").unwrap();
        }
        fs::write(client.cache_dir.join("wget-1.25.0.bottle"), b"x").unwrap();
        fs::write(client.cache_dir.join("stray.tmp"), b"x").unwrap();

        let report = run(&client).unwrap();
        let removed: Vec<String> = report
            .removed_cache_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(removed.contains(&"wget-1.25.0.bottle".to_string()));
        assert!(removed.contains(&"stray.tmp".to_string()));
        assert!(client.cache_dir.join("formula.json.zst").exists());
        assert!(client
            .cache_dir
            .join("wget-1.25.0.bottle.fastbrew-resume")
            .exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlinks_removed() {
        let dir = TempDir::new().unwrap();
        let client = client_for(&dir);
        let bin = client.prefix.join("bin");
        fs::create_dir_all(&bin).unwrap();

        // A live link and a dangling one.
        let keg_bin = client.cellar.join("live/1.0/bin");
        fs::create_dir_all(&keg_bin).unwrap();
        fs::write(keg_bin.join("live"), b"#!/bin/sh\n").unwrap();
        std::os::unix::fs::symlink(keg_bin.join("live"), bin.join("live")).unwrap();
        std::os::unix::fs::symlink(client.cellar.join("gone/1.0/bin/gone"), bin.join("gone"))
            .unwrap();

        let report = run(&client).unwrap();
        assert_eq!(report.removed_symlinks.len(), 1);
        assert!(bin.join("live").exists());
        assert!(!bin.join("gone").exists());
    }
}
