//! Symlink farm management.
//!
//! Installed kegs are exposed through the shared prefix: a stable
//! `<prefix>/opt/<name>` link to the active keg, plus per-file symlinks
//! mirroring the keg's `bin/`, `lib/`, ... subtrees. Unlink only ever
//! removes links whose target resolves into the keg being removed, so
//! foreign links survive.

use crate::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Keg subdirectories mirrored into the prefix.
#[cfg(target_os = "macos")]
pub const LINK_DIRS: &[&str] = &["bin", "sbin", "lib", "include", "share", "etc", "Frameworks"];
#[cfg(not(target_os = "macos"))]
pub const LINK_DIRS: &[&str] = &["bin", "sbin", "lib", "include", "share", "etc"];

/// Outcome of linking one keg.
#[derive(Debug, Default)]
pub struct LinkResult {
    pub package: String,
    /// Relative paths (under their link dir) this keg claims.
    pub links: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl LinkResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Create the opt link and all file symlinks for a keg.
pub fn link_keg(prefix: &Path, cellar: &Path, name: &str, version: &str) -> Result<LinkResult> {
    link_internal(prefix, cellar, name, version, false, None)
}

/// Enumerate the links a keg would create without touching the
/// filesystem. Phase one of the install-time conflict protocol.
pub fn link_keg_dry_run(
    prefix: &Path,
    cellar: &Path,
    name: &str,
    version: &str,
) -> Result<LinkResult> {
    link_internal(prefix, cellar, name, version, true, None)
}

/// Link a keg while leaving the given relative paths alone. Used for
/// conflicted installs where an earlier keg already owns those paths.
pub fn link_keg_skipping(
    prefix: &Path,
    cellar: &Path,
    name: &str,
    version: &str,
    skip: &std::collections::HashSet<PathBuf>,
) -> Result<LinkResult> {
    link_internal(prefix, cellar, name, version, false, Some(skip))
}

fn link_internal(
    prefix: &Path,
    cellar: &Path,
    name: &str,
    version: &str,
    dry_run: bool,
    skip: Option<&std::collections::HashSet<PathBuf>>,
) -> Result<LinkResult> {
    let keg = cellar.join(name).join(version);
    let mut result = LinkResult {
        package: name.to_string(),
        ..Default::default()
    };

    if !dry_run {
        if let Err(e) = create_opt_link(prefix, &keg, name) {
            result.errors.push(format!("failed to create opt link: {e}"));
        }
    }

    for dir in LINK_DIRS {
        let source_dir = keg.join(dir);
        if !source_dir.is_dir() {
            continue;
        }
        let target_dir = prefix.join(dir);
        if !dry_run {
            fs::create_dir_all(&target_dir)?;
        }
        link_dir(&source_dir, &target_dir, Path::new(dir), &mut result, dry_run, skip)?;
    }

    Ok(result)
}

fn link_dir(
    source_dir: &Path,
    target_dir: &Path,
    rel_base: &Path,
    result: &mut LinkResult,
    dry_run: bool,
    skip: Option<&std::collections::HashSet<PathBuf>>,
) -> Result<()> {
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        let source = entry.path();
        let file_name = entry.file_name();
        let target = target_dir.join(&file_name);
        let rel = rel_base.join(&file_name);

        if source.is_dir() {
            if !dry_run {
                fs::create_dir_all(&target)?;
            }
            link_dir(&source, &target, &rel, result, dry_run, skip)?;
            continue;
        }

        if skip.is_some_and(|s| s.contains(&rel)) {
            continue;
        }

        result.links.push(rel.clone());
        if dry_run {
            continue;
        }

        // Existing symlinks are overwritten; regular files are kept.
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_symlink() => {
                let _ = fs::remove_file(&target);
            }
            Ok(_) => {
                tracing::warn!(
                    target = %target.display(),
                    "exists as a regular file, skipping link"
                );
                continue;
            }
            Err(_) => {}
        }

        #[cfg(unix)]
        if let Err(e) = std::os::unix::fs::symlink(&source, &target) {
            result
                .errors
                .push(format!("failed to link {}: {e}", rel.display()));
        }
    }

    Ok(())
}

/// Point `<prefix>/opt/<name>` at the keg, replacing any previous link.
pub fn create_opt_link(prefix: &Path, keg: &Path, name: &str) -> Result<()> {
    let opt_dir = prefix.join("opt");
    fs::create_dir_all(&opt_dir)?;
    let opt_link = opt_dir.join(name);

    if let Ok(meta) = fs::symlink_metadata(&opt_link) {
        if meta.is_symlink() {
            fs::remove_file(&opt_link)?;
        }
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(keg, &opt_link)?;
    Ok(())
}

/// The version a package's opt link currently points at, if any.
pub fn linked_version(prefix: &Path, name: &str) -> Option<String> {
    let opt_link = prefix.join("opt").join(name);
    let target = fs::read_link(&opt_link).ok()?;
    target
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
}

/// Remove every prefix symlink owned by this package, across all of its
/// installed versions, plus the opt link when it points into the keg.
pub fn unlink_keg(prefix: &Path, cellar: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let pkg_dir = cellar.join(name);
    let owner_prefix = pkg_dir.clone();
    let mut removed = Vec::new();

    let opt_link = prefix.join("opt").join(name);
    if let Ok(meta) = fs::symlink_metadata(&opt_link) {
        if meta.is_symlink() {
            let points_into_keg = fs::read_link(&opt_link)
                .map(|t| resolve_link(&opt_link, &t).starts_with(&owner_prefix))
                .unwrap_or(true);
            if points_into_keg {
                fs::remove_file(&opt_link)?;
                removed.push(opt_link);
            }
        }
    }

    let versions = match fs::read_dir(&pkg_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(e.into()),
    };

    for version in versions {
        let version = version?;
        if !version.path().is_dir() {
            continue;
        }

        for dir in LINK_DIRS {
            let source_dir = version.path().join(dir);
            if !source_dir.is_dir() {
                continue;
            }
            let target_dir = prefix.join(dir);
            unlink_dir(&source_dir, &target_dir, &owner_prefix, &mut removed)?;
        }
    }

    Ok(removed)
}

fn unlink_dir(
    source_dir: &Path,
    target_dir: &Path,
    owner_prefix: &Path,
    removed: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = match fs::read_dir(source_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries {
        let entry = entry?;
        let source = entry.path();
        let target = target_dir.join(entry.file_name());

        if source.is_dir() {
            unlink_dir(&source, &target, owner_prefix, removed)?;
            continue;
        }

        let Ok(meta) = fs::symlink_metadata(&target) else {
            continue;
        };
        if !meta.is_symlink() {
            continue;
        }
        let Ok(link_target) = fs::read_link(&target) else {
            continue;
        };

        if resolve_link(&target, &link_target).starts_with(owner_prefix) {
            match fs::remove_file(&target) {
                Ok(()) => removed.push(target),
                Err(e) => {
                    tracing::warn!(path = %target.display(), error = %e, "failed to remove symlink");
                }
            }
        }
    }

    Ok(())
}

/// Resolve a symlink target against the link's directory and strip `.`
/// and `..` components, without following further links.
fn resolve_link(link_path: &Path, target: &Path) -> PathBuf {
    let absolute = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link_path
            .parent()
            .unwrap_or(Path::new("/"))
            .join(target)
    };

    let mut parts: Vec<std::path::Component> = Vec::new();
    for component in absolute.components() {
        match component {
            std::path::Component::ParentDir => {
                if matches!(parts.last(), Some(std::path::Component::Normal(_))) {
                    parts.pop();
                }
            }
            std::path::Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// A contested relative path across two kegs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConflict {
    pub path: PathBuf,
    pub first: String,
    pub second: String,
}

/// Maps each would-be link to its first claimant; later claims of the
/// same path are recorded as conflicts. First writer wins.
#[derive(Debug, Default)]
pub struct ConflictTracker {
    claims: HashMap<PathBuf, String>,
    conflicts: Vec<LinkConflict>,
}

impl ConflictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a claim. Returns the earlier claimant when the path is
    /// already owned by a different package.
    pub fn check_and_track(&mut self, path: &Path, package: &str) -> Option<String> {
        if let Some(owner) = self.claims.get(path) {
            if owner == package {
                return None;
            }
            let owner = owner.clone();
            self.conflicts.push(LinkConflict {
                path: path.to_path_buf(),
                first: owner.clone(),
                second: package.to_string(),
            });
            return Some(owner);
        }
        self.claims.insert(path.to_path_buf(), package.to_string());
        None
    }

    pub fn conflicts(&self) -> &[LinkConflict] {
        &self.conflicts
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Every package that appears on either side of a conflict.
    pub fn conflicting_packages(&self) -> std::collections::HashSet<String> {
        let mut packages = std::collections::HashSet::new();
        for conflict in &self.conflicts {
            packages.insert(conflict.first.clone());
            packages.insert(conflict.second.clone());
        }
        packages
    }

    pub fn tracked(&self) -> &HashMap<PathBuf, String> {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_tracker_first_writer_wins() {
        let mut tracker = ConflictTracker::new();
        assert!(tracker.check_and_track(Path::new("bin/foo"), "a").is_none());
        assert_eq!(
            tracker.check_and_track(Path::new("bin/foo"), "b"),
            Some("a".to_string())
        );
        // Re-claiming your own path is not a conflict.
        assert!(tracker.check_and_track(Path::new("bin/foo"), "a").is_none());

        assert_eq!(tracker.conflicts().len(), 1);
        let conflict = &tracker.conflicts()[0];
        assert_eq!(conflict.first, "a");
        assert_eq!(conflict.second, "b");

        let packages = tracker.conflicting_packages();
        assert!(packages.contains("a") && packages.contains("b"));
    }

    #[test]
    fn test_resolve_link() {
        assert_eq!(
            resolve_link(
                Path::new("/prefix/bin/tool"),
                Path::new("../Cellar/pkg/1.0/bin/tool")
            ),
            PathBuf::from("/prefix/Cellar/pkg/1.0/bin/tool")
        );
        assert_eq!(
            resolve_link(Path::new("/prefix/bin/tool"), Path::new("/abs/target")),
            PathBuf::from("/abs/target")
        );
    }
}
