//! Parallel health checks over the prefix, Cellar and cache.
//!
//! Nine independent checks run concurrently; each reports a status and
//! a suggestion but never mutates anything. Repairs belong to the
//! explicit `cleanup` command.

use crate::cache::{self, CacheValidator};
use crate::cellar;
use crate::client::Client;
use crate::symlink;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
    Info,
}

#[derive(Debug)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub suggestion: Option<String>,
    pub details: Vec<String>,
}

impl CheckResult {
    fn ok(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Ok,
            message: message.into(),
            suggestion: None,
            details: Vec::new(),
        }
    }

    fn with(
        name: &'static str,
        status: CheckStatus,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name,
            status,
            message: message.into(),
            suggestion: Some(suggestion.into()),
            details: Vec::new(),
        }
    }
}

/// Run all nine checks in parallel, results in a stable order.
pub fn run_diagnostics(client: &Client) -> Vec<CheckResult> {
    let checks: Vec<(usize, fn(&Client) -> CheckResult)> = vec![
        (0, check_installation),
        (1, check_cellar_permissions),
        (2, check_broken_symlinks),
        (3, check_outdated_index),
        (4, check_disk_space),
        (5, check_duplicate_binaries),
        (6, check_unlinked_packages),
        (7, check_path_configuration),
        (8, check_cache_integrity),
    ];

    let mut results: Vec<(usize, CheckResult)> = checks
        .into_par_iter()
        .map(|(index, check)| (index, check(client)))
        .collect();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Exit code for the CLI: non-zero on any warning or error.
pub fn exit_code(results: &[CheckResult]) -> i32 {
    let unhealthy = results
        .iter()
        .any(|r| matches!(r.status, CheckStatus::Warning | CheckStatus::Error));
    i32::from(unhealthy)
}

fn check_installation(client: &Client) -> CheckResult {
    const NAME: &str = "Homebrew installation";

    if !client.prefix.exists() {
        return CheckResult::with(
            NAME,
            CheckStatus::Error,
            "Homebrew installation not found",
            "Install Homebrew from https://brew.sh",
        );
    }
    if !client.cellar.exists() {
        return CheckResult::with(
            NAME,
            CheckStatus::Warning,
            "Cellar directory does not exist",
            "Run: fastbrew install <package> to initialize the Cellar",
        );
    }
    CheckResult::ok(NAME, format!("Found at {}", client.prefix.display()))
}

fn check_cellar_permissions(client: &Client) -> CheckResult {
    const NAME: &str = "Cellar permissions";

    let Ok(meta) = fs::metadata(&client.cellar) else {
        return CheckResult::ok(NAME, "Cellar not initialized yet");
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o200 == 0 {
            return CheckResult::with(
                NAME,
                CheckStatus::Error,
                "Cellar not writable",
                format!("Run: sudo chown -R $(whoami) {}", client.cellar.display()),
            );
        }
    }
    #[cfg(not(unix))]
    let _ = meta;

    CheckResult::ok(NAME, "Writable")
}

fn check_broken_symlinks(client: &Client) -> CheckResult {
    const NAME: &str = "Broken symlinks";

    let bin_dir = client.prefix.join("bin");
    let Ok(entries) = fs::read_dir(&bin_dir) else {
        return CheckResult::ok(NAME, "No bin directory to check");
    };

    let mut broken = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_symlink() && fs::metadata(&path).is_err() {
            broken.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    if broken.is_empty() {
        CheckResult::ok(NAME, "None found")
    } else {
        let mut result = CheckResult::with(
            NAME,
            CheckStatus::Error,
            format!("{} broken symlink(s) found", broken.len()),
            "Run: fastbrew cleanup",
        );
        result.details = broken;
        result
    }
}

fn check_outdated_index(client: &Client) -> CheckResult {
    const NAME: &str = "Outdated index";

    let formula_path = client.catalog().formula_path();
    let Ok(meta) = fs::metadata(&formula_path) else {
        return CheckResult::with(
            NAME,
            CheckStatus::Warning,
            "Index not downloaded",
            "Run: fastbrew update",
        );
    };

    let days = meta
        .modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .map(|age| age.as_secs() / 86_400)
        .unwrap_or(0);

    if days > 7 {
        CheckResult::with(
            NAME,
            CheckStatus::Warning,
            format!("Last updated {days} days ago"),
            "Run: fastbrew update",
        )
    } else {
        CheckResult::ok(NAME, format!("Updated {days} day(s) ago"))
    }
}

fn check_disk_space(client: &Client) -> CheckResult {
    const NAME: &str = "Disk space";

    let Ok(output) = Command::new("df").arg("-h").arg(&client.prefix).output() else {
        return CheckResult::ok(NAME, "Unable to check disk space");
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let available = stdout
        .lines()
        .last()
        .map(str::split_whitespace)
        .and_then(|mut fields| fields.nth(3));

    match available {
        Some(avail) => CheckResult::ok(NAME, format!("{avail} available")),
        None => CheckResult::ok(NAME, "Unable to parse disk space"),
    }
}

fn check_duplicate_binaries(client: &Client) -> CheckResult {
    const NAME: &str = "Duplicate binaries";

    let bin_dir = client.prefix.join("bin");
    let Ok(entries) = fs::read_dir(&bin_dir) else {
        return CheckResult::ok(NAME, "No bin directory to check");
    };

    // The farm allows one symlink per name, so a duplicate shows up as
    // a binary whose keg has a same-named file in another keg.
    let mut owners: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if !meta.is_symlink() {
            continue;
        }
        if let Ok(target) = fs::read_link(&path) {
            owners
                .entry(entry.file_name().to_string_lossy().to_string())
                .or_default()
                .push(target.display().to_string());
        }
    }

    let installed = cellar::list_installed(&client.cellar).unwrap_or_default();
    let mut conflicts = Vec::new();
    for (binary, targets) in &owners {
        let providers: Vec<&str> = installed
            .iter()
            .filter(|pkg| {
                cellar::keg_path(&client.cellar, &pkg.name, &pkg.version)
                    .join("bin")
                    .join(binary)
                    .exists()
            })
            .map(|pkg| pkg.name.as_str())
            .collect();
        if providers.len() > 1 {
            conflicts.push(format!(
                "{binary} -> {} (provided by {})",
                targets.join(", "),
                providers.join(", ")
            ));
        }
    }

    if conflicts.is_empty() {
        CheckResult::ok(NAME, "No conflicts found")
    } else {
        let mut result = CheckResult::with(
            NAME,
            CheckStatus::Warning,
            format!("{} conflict(s) found", conflicts.len()),
            "Run: fastbrew unlink <formula> for one of the packages",
        );
        result.details = conflicts;
        result
    }
}

fn check_unlinked_packages(client: &Client) -> CheckResult {
    const NAME: &str = "Unlinked packages";

    let installed = match cellar::list_installed(&client.cellar) {
        Ok(installed) if !installed.is_empty() => installed,
        _ => return CheckResult::ok(NAME, "No packages installed"),
    };

    let mut unlinked = Vec::new();
    for pkg in &installed {
        let bin_dir = cellar::keg_path(&client.cellar, &pkg.name, &pkg.version).join("bin");
        let Ok(entries) = fs::read_dir(&bin_dir) else {
            continue;
        };

        let missing = entries.flatten().any(|bin| {
            let link = client.prefix.join("bin").join(bin.file_name());
            fs::symlink_metadata(&link).is_err()
        });
        if missing && symlink::linked_version(&client.prefix, &pkg.name).is_none() {
            unlinked.push(pkg.name.clone());
        }
    }

    if unlinked.is_empty() {
        CheckResult::ok(NAME, "All packages linked")
    } else {
        let mut result = CheckResult::with(
            NAME,
            CheckStatus::Warning,
            format!("{} package(s) not linked", unlinked.len()),
            "Run: fastbrew link <package>",
        );
        result.details = unlinked;
        result
    }
}

fn check_path_configuration(client: &Client) -> CheckResult {
    const NAME: &str = "PATH configuration";

    let Ok(path) = std::env::var("PATH") else {
        return CheckResult::with(
            NAME,
            CheckStatus::Error,
            "PATH environment variable is empty",
            "Set PATH in your shell configuration",
        );
    };

    let bin_path = client.prefix.join("bin");
    let position = std::env::split_paths(&path).position(|p| p == bin_path);

    match position {
        None => CheckResult::with(
            NAME,
            CheckStatus::Warning,
            format!("{} not in PATH", bin_path.display()),
            format!(
                "Add 'export PATH=\"{}:$PATH\"' to your shell config",
                bin_path.display()
            ),
        ),
        Some(0) => CheckResult::ok(NAME, format!("{} is first in PATH", bin_path.display())),
        Some(_) => CheckResult::with(
            NAME,
            CheckStatus::Warning,
            "Homebrew bin is not first in PATH",
            format!(
                "Move '{}' to the beginning of PATH for priority",
                bin_path.display()
            ),
        ),
    }
}

fn check_cache_integrity(client: &Client) -> CheckResult {
    const NAME: &str = "Cache integrity";

    if !cache_present(&client.cache_dir) {
        return CheckResult::ok(NAME, "Cache not populated yet");
    }

    let statuses = CacheValidator::new(&client.cache_dir).validate_all();
    let invalid: Vec<String> = statuses
        .iter()
        .filter(|s| !s.valid && s.path.exists())
        .map(|s| {
            format!(
                "{}: {}",
                s.path.file_name().unwrap_or_default().to_string_lossy(),
                s.error.as_deref().unwrap_or("invalid")
            )
        })
        .collect();

    if invalid.is_empty() {
        CheckResult::ok(NAME, "All cache files valid")
    } else {
        let mut result = CheckResult::with(
            NAME,
            CheckStatus::Error,
            format!("{} cache file(s) corrupted or invalid", invalid.len()),
            "Run: fastbrew update",
        );
        result.details = invalid;
        result
    }
}

fn cache_present(cache_dir: &Path) -> bool {
    cache::CatalogStore::new(cache_dir).formula_path().exists()
}
