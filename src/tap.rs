//! Third-party tap registry.
//!
//! Taps themselves are managed by the host package manager; FastBrew
//! only keeps a small JSON registry so tap-qualified names can be
//! recognized and routed. Anything of the form `user/repo/formula`
//! is delegated.

use crate::config;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tap {
    pub name: String,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub is_custom: bool,
}

pub fn taps_path() -> PathBuf {
    config::config_dir().join("taps.json")
}

/// Whether a requested name refers to a tap formula
/// (`user/repo/formula`) rather than a core one. Fully-qualified core
/// names (`homebrew/core/wget`) are not taps.
pub fn is_tap_formula(name: &str) -> bool {
    name.matches('/').count() == 2 && !name.starts_with("homebrew/core/")
}

pub fn list_taps() -> Result<Vec<Tap>> {
    load_from(&taps_path())
}

pub fn load_from(path: &Path) -> Result<Vec<Tap>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&data)?)
}

pub fn save_to(path: &Path, taps: &[Tap]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(taps)?)?;
    Ok(())
}

/// Record a tap in the registry, replacing any entry with the same name.
pub fn record(path: &Path, tap: Tap) -> Result<()> {
    let mut taps = load_from(path)?;
    taps.retain(|t| t.name != tap.name);
    taps.push(tap);
    save_to(path, &taps)
}

pub fn remove(path: &Path, name: &str) -> Result<bool> {
    let mut taps = load_from(path)?;
    let before = taps.len();
    taps.retain(|t| t.name != name);
    let removed = taps.len() != before;
    if removed {
        save_to(path, &taps)?;
    }
    Ok(removed)
}
