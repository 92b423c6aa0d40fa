//! User configuration and the pinned-package file.
//!
//! Both live under `~/.fastbrew/`. The config is loaded once per
//! process; `pinned` is a line-oriented file so users can edit it by
//! hand (`#` starts a comment).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

const MAX_PARALLEL: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parallel_downloads: u32,
    pub show_progress: bool,
    pub auto_cleanup: bool,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel_downloads: 10,
            show_progress: false,
            auto_cleanup: false,
            verbose: false,
        }
    }
}

impl Config {
    /// The configured download parallelism, clamped to 1..=20.
    pub fn parallel_downloads(&self) -> usize {
        self.parallel_downloads.clamp(1, MAX_PARALLEL) as usize
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// `~/.fastbrew`
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fastbrew")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn cache_dir() -> PathBuf {
    config_dir().join("cache")
}

pub fn pinned_path() -> PathBuf {
    config_dir().join("pinned")
}

/// The process-wide config, read once from disk. Missing or unreadable
/// files fall back to defaults.
pub fn load() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| read_config().unwrap_or_default())
}

fn read_config() -> Option<Config> {
    let data = fs::read_to_string(config_path()).ok()?;
    serde_json::from_str(&data).ok()
}

/// Formulae excluded from upgrades.
pub fn load_pinned() -> Result<BTreeSet<String>> {
    load_pinned_from(&pinned_path())
}

pub fn load_pinned_from(path: &std::path::Path) -> Result<BTreeSet<String>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub fn save_pinned(pinned: &BTreeSet<String>) -> Result<()> {
    save_pinned_to(&pinned_path(), pinned)
}

pub fn save_pinned_to(path: &std::path::Path, pinned: &BTreeSet<String>) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut contents = String::new();
    for name in pinned {
        contents.push_str(name);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parallel_downloads_clamped() {
        let mut config = Config::default();
        assert_eq!(config.parallel_downloads(), 10);

        config.parallel_downloads = 0;
        assert_eq!(config.parallel_downloads(), 1);

        config.parallel_downloads = 99;
        assert_eq!(config.parallel_downloads(), 20);
    }

    #[test]
    fn test_config_tolerates_partial_json() {
        let config: Config = serde_json::from_str(r#"{"parallel_downloads": 4}"#).unwrap();
        assert_eq!(config.parallel_downloads, 4);
        assert!(!config.verbose);
    }

    #[test]
    fn test_pinned_roundtrip_ignores_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pinned");
        fs::write(&path, "# comment\nwget\n\n  ripgrep  \n#foo\n").unwrap();

        let pinned = load_pinned_from(&path).unwrap();
        assert_eq!(
            pinned,
            BTreeSet::from(["wget".to_string(), "ripgrep".to_string()])
        );

        save_pinned_to(&path, &pinned).unwrap();
        assert_eq!(load_pinned_from(&path).unwrap(), pinned);
    }

    #[test]
    fn test_missing_pinned_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load_pinned_from(&dir.path().join("pinned"))
            .unwrap()
            .is_empty());
    }
}
