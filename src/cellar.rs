//! Cellar inspection - reading installed packages without shelling out.
//!
//! Formulae are discovered by scanning `<prefix>/Cellar/<name>/<version>/`
//! directly; casks live outside the Cellar and are listed by delegating
//! to the host `brew` binary.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Minimal record for listing and joining against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub installed: bool,
    pub is_cask: bool,
}

/// Scan the Cellar for installed formulae. The latest version subdir
/// provides the reported version; hidden entries are skipped.
pub fn list_installed(cellar: &Path) -> Result<Vec<PackageInfo>> {
    let mut packages = Vec::new();

    let entries = match fs::read_dir(cellar) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(packages),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let versions = installed_versions(cellar, &name)?;
        if let Some(latest) = versions.first() {
            packages.push(PackageInfo {
                name,
                version: latest.clone(),
                installed: true,
                is_cask: false,
            });
        }
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// All installed versions of one formula, newest first.
pub fn installed_versions(cellar: &Path, name: &str) -> Result<Vec<String>> {
    let formula_dir = cellar.join(name);
    let mut versions = Vec::new();

    let entries = match fs::read_dir(&formula_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let version = entry.file_name().to_string_lossy().to_string();
        if version.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        versions.push(version);
    }

    versions.sort_by(|a, b| compare_versions(b, a));
    Ok(versions)
}

pub fn is_installed(cellar: &Path, name: &str) -> bool {
    cellar.join(name).is_dir()
}

pub fn keg_path(cellar: &Path, name: &str, version: &str) -> PathBuf {
    cellar.join(name).join(version)
}

/// Casks installed by the host package manager.
pub fn list_installed_casks() -> Vec<PackageInfo> {
    let output = match Command::new("brew").args(["list", "--cask"]).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| PackageInfo {
            name: name.to_string(),
            version: String::new(),
            installed: true,
            is_cask: true,
        })
        .collect()
}

/// Numeric-then-lexicographic version comparison so `1.10.0` sorts
/// after `1.9.0`.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let a_parts: Vec<u64> = a.split('.').filter_map(|s| parse_numeric_prefix(s)).collect();
    let b_parts: Vec<u64> = b.split('.').filter_map(|s| parse_numeric_prefix(s)).collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }

    a.cmp(b)
}

fn parse_numeric_prefix(part: &str) -> Option<u64> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Strip a trailing bottle revision (`1.4.0_2` -> `1.4.0`). Only the
/// portion before the first underscore is kept, matching how the
/// upstream catalog reports stable versions.
pub fn strip_revision(version: &str) -> &str {
    match version.find('_') {
        Some(idx) => &version[..idx],
        None => version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_keg(cellar: &Path, name: &str, version: &str) {
        fs::create_dir_all(cellar.join(name).join(version).join("bin")).unwrap();
    }

    #[test]
    fn test_list_installed_scans_cellar() {
        let dir = TempDir::new().unwrap();
        let cellar = dir.path();
        make_keg(cellar, "wget", "1.25.0");
        make_keg(cellar, "ripgrep", "14.1.1");
        fs::create_dir_all(cellar.join(".hidden")).unwrap();

        let packages = list_installed(cellar).unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ripgrep", "wget"]);
        assert!(packages.iter().all(|p| p.installed && !p.is_cask));
    }

    #[test]
    fn test_missing_cellar_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("Cellar");
        assert!(list_installed(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_latest_version_reported() {
        let dir = TempDir::new().unwrap();
        let cellar = dir.path();
        make_keg(cellar, "openssl@3", "3.1.0");
        make_keg(cellar, "openssl@3", "3.10.2");
        make_keg(cellar, "openssl@3", "3.2.0");

        let versions = installed_versions(cellar, "openssl@3").unwrap();
        assert_eq!(versions, vec!["3.10.2", "3.2.0", "3.1.0"]);

        let packages = list_installed(cellar).unwrap();
        assert_eq!(packages[0].version, "3.10.2");
    }

    #[test]
    fn test_compare_versions() {
        use std::cmp::Ordering;
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_versions("3.2.0", "3.10.2"), Ordering::Less);
    }

    #[test]
    fn test_strip_revision() {
        assert_eq!(strip_revision("1.4.0_2"), "1.4.0");
        assert_eq!(strip_revision("1.4.0"), "1.4.0");
        assert_eq!(strip_revision("8.0_1"), "8.0");
        assert_eq!(strip_revision("foo_bar_1"), "foo");
        assert_eq!(strip_revision(""), "");
    }

    #[test]
    fn test_is_installed() {
        let dir = TempDir::new().unwrap();
        make_keg(dir.path(), "jq", "1.7.1");
        assert!(is_installed(dir.path(), "jq"));
        assert!(!is_installed(dir.path(), "fzf"));
    }
}
