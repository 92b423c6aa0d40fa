//! Sidecar metadata for interrupted downloads.
//!
//! Every in-flight download owns a `<file>.fastbrew-resume` JSON sidecar
//! describing how far it got and which remote validators (ETag,
//! Last-Modified) the partial bytes correspond to. State changes go
//! through an explicit transition table and are appended to a history so
//! a sidecar found on disk can be audited before the partial is trusted.

use crate::error::{FastBrewError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RESUME_SUFFIX: &str = ".fastbrew-resume";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::Pending => "pending",
            DownloadState::InProgress => "in_progress",
            DownloadState::Complete => "complete",
            DownloadState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Complete | DownloadState::Failed)
    }

    /// A download in this state may be continued from existing bytes.
    pub fn can_resume(&self) -> bool {
        matches!(self, DownloadState::Pending | DownloadState::Failed)
    }
}

/// Legal transitions:
///
/// ```text
/// Pending    -> InProgress | Failed
/// InProgress -> Complete | Failed | Pending
/// Failed     -> Pending | InProgress
/// Complete   -> (terminal)
/// ```
///
/// Self-transitions are permitted everywhere.
pub fn validate_transition(from: DownloadState, to: DownloadState) -> Result<()> {
    use DownloadState::*;

    if from == to {
        return Ok(());
    }

    let legal = match from {
        Pending => matches!(to, InProgress | Failed),
        InProgress => matches!(to, Complete | Failed | Pending),
        Failed => matches!(to, Pending | InProgress),
        Complete => false,
    };

    if legal {
        Ok(())
    } else {
        Err(FastBrewError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDownload {
    pub url: String,
    pub local_path: PathBuf,
    pub total_size: u64,
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub etag: String,
    pub state: DownloadState,
    #[serde(default)]
    pub state_history: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartialDownload {
    pub fn metadata_path(&self) -> PathBuf {
        sidecar_path(&self.local_path)
    }

    /// Apply a state change, recording it in the history.
    pub fn update_state(&mut self, to: DownloadState) -> Result<()> {
        validate_transition(self.state, to)?;

        self.state_history.push(StateTransition {
            from_state: self.state.as_str().to_string(),
            to_state: to.as_str().to_string(),
            timestamp: Utc::now(),
        });
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        self.downloaded_bytes as f64 / self.total_size as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.state == DownloadState::Complete
    }
}

fn sidecar_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_os_string();
    name.push(RESUME_SUFFIX);
    PathBuf::from(name)
}

/// Persistence for download sidecars, colocated with their targets.
pub struct ResumeStore {
    base_dir: PathBuf,
}

impl ResumeStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create and persist a fresh sidecar in the `Pending` state.
    pub fn create(&self, url: &str, local_path: &Path) -> Result<PartialDownload> {
        let now = Utc::now();
        let pd = PartialDownload {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            total_size: 0,
            downloaded_bytes: 0,
            checksum: String::new(),
            last_modified: String::new(),
            etag: String::new(),
            state: DownloadState::Pending,
            state_history: vec![StateTransition {
                from_state: String::new(),
                to_state: DownloadState::Pending.as_str().to_string(),
                timestamp: now,
            }],
            created_at: now,
            updated_at: now,
        };
        self.save(&pd)?;
        Ok(pd)
    }

    pub fn load(&self, local_path: &Path) -> Result<PartialDownload> {
        let path = sidecar_path(local_path);
        let data = fs::read_to_string(&path)?;
        let mut pd: PartialDownload = serde_json::from_str(&data)?;
        pd.local_path = local_path.to_path_buf();
        Ok(pd)
    }

    pub fn save(&self, pd: &PartialDownload) -> Result<()> {
        let path = pd.metadata_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(pd)?;
        fs::write(&path, data)?;
        Ok(())
    }

    pub fn delete(&self, local_path: &Path) -> Result<()> {
        let path = sidecar_path(local_path);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, local_path: &Path) -> bool {
        sidecar_path(local_path).exists()
    }

    /// All sidecars under the base directory that still parse.
    pub fn list(&self) -> Result<Vec<PartialDownload>> {
        let mut downloads = Vec::new();

        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(downloads),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(RESUME_SUFFIX) {
                if let Ok(pd) = self.load(&self.base_dir.join(stem)) {
                    downloads.push(pd);
                }
            }
        }

        Ok(downloads)
    }
}

/// Whether an on-disk partial can be continued against the remote file
/// described by `last_modified` / `etag`. Any validator change, missing
/// local file or size inconsistency disqualifies the partial.
pub fn can_resume_download(pd: &PartialDownload, last_modified: &str, etag: &str) -> bool {
    if !pd.state.can_resume() {
        return false;
    }

    let Ok(meta) = fs::metadata(&pd.local_path) else {
        return false;
    };

    if remote_changed(pd, last_modified, etag) {
        return false;
    }

    if pd.total_size > 0 && meta.len() > pd.total_size {
        return false;
    }

    true
}

pub fn remote_changed(pd: &PartialDownload, last_modified: &str, etag: &str) -> bool {
    if !pd.last_modified.is_empty() && !last_modified.is_empty() && pd.last_modified != last_modified
    {
        return true;
    }
    if !pd.etag.is_empty() && !etag.is_empty() && pd.etag != etag {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_valid_transitions() {
        use DownloadState::*;
        assert!(validate_transition(Pending, InProgress).is_ok());
        assert!(validate_transition(Pending, Failed).is_ok());
        assert!(validate_transition(InProgress, Complete).is_ok());
        assert!(validate_transition(InProgress, Failed).is_ok());
        assert!(validate_transition(InProgress, Pending).is_ok());
        assert!(validate_transition(Failed, Pending).is_ok());
        assert!(validate_transition(Failed, InProgress).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        use DownloadState::*;
        assert!(validate_transition(Complete, Pending).is_err());
        assert!(validate_transition(Complete, InProgress).is_err());
        assert!(validate_transition(Complete, Failed).is_err());
        assert!(validate_transition(Pending, Complete).is_err());
        assert!(validate_transition(Failed, Complete).is_err());
    }

    #[test]
    fn test_self_transition_allowed() {
        use DownloadState::*;
        for state in [Pending, InProgress, Complete, Failed] {
            assert!(validate_transition(state, state).is_ok());
        }
    }

    #[test]
    fn test_history_records_every_transition() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("pkg.bottle");

        let mut pd = store.create("https://example.com/pkg", &target).unwrap();
        pd.update_state(DownloadState::InProgress).unwrap();
        pd.update_state(DownloadState::Failed).unwrap();
        pd.update_state(DownloadState::InProgress).unwrap();
        pd.update_state(DownloadState::Complete).unwrap();

        // Initial entry plus four transitions.
        assert_eq!(pd.state_history.len(), 5);

        // Every adjacent pair in the history must be a legal edge.
        for pair in pd.state_history.windows(2) {
            assert_eq!(pair[0].to_state, pair[1].from_state);
        }
        assert_eq!(pd.state, DownloadState::Complete);
        assert!(pd.update_state(DownloadState::Pending).is_err());
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("wget-1.25.0.bottle");

        let mut pd = store.create("https://ghcr.io/v2/blob", &target).unwrap();
        pd.total_size = 1000;
        pd.downloaded_bytes = 400;
        pd.etag = "\"abc\"".to_string();
        pd.update_state(DownloadState::InProgress).unwrap();
        store.save(&pd).unwrap();

        assert!(store.exists(&target));
        let loaded = store.load(&target).unwrap();
        assert_eq!(loaded.url, pd.url);
        assert_eq!(loaded.downloaded_bytes, 400);
        assert_eq!(loaded.state, DownloadState::InProgress);
        assert_eq!(loaded.etag, "\"abc\"");

        store.delete(&target).unwrap();
        assert!(!store.exists(&target));
        // Deleting again is not an error.
        store.delete(&target).unwrap();
    }

    #[test]
    fn test_list_finds_sidecars() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());

        store
            .create("https://example.com/a", &dir.path().join("a.bottle"))
            .unwrap();
        store
            .create("https://example.com/b", &dir.path().join("b.bottle"))
            .unwrap();

        let mut urls: Vec<_> = store.list().unwrap().into_iter().map(|p| p.url).collect();
        urls.sort();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_can_resume_requires_local_file() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("pkg.bottle");

        let pd = store.create("https://example.com/pkg", &target).unwrap();
        // No bytes on disk yet.
        assert!(!can_resume_download(&pd, "", ""));

        std::fs::write(&target, b"partial").unwrap();
        assert!(can_resume_download(&pd, "", ""));
    }

    #[test]
    fn test_validator_change_blocks_resume() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("pkg.bottle");
        std::fs::write(&target, b"partial").unwrap();

        let mut pd = store.create("https://example.com/pkg", &target).unwrap();
        pd.etag = "\"v1\"".to_string();
        pd.last_modified = "Mon, 01 Jan 2024 00:00:00 GMT".to_string();

        assert!(can_resume_download(&pd, "Mon, 01 Jan 2024 00:00:00 GMT", "\"v1\""));
        assert!(!can_resume_download(&pd, "Tue, 02 Jan 2024 00:00:00 GMT", "\"v1\""));
        assert!(!can_resume_download(&pd, "Mon, 01 Jan 2024 00:00:00 GMT", "\"v2\""));
    }

    #[test]
    fn test_oversized_partial_blocks_resume() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("pkg.bottle");
        std::fs::write(&target, vec![0u8; 64]).unwrap();

        let mut pd = store.create("https://example.com/pkg", &target).unwrap();
        pd.total_size = 32;
        assert!(!can_resume_download(&pd, "", ""));

        pd.total_size = 128;
        assert!(can_resume_download(&pd, "", ""));
    }

    #[test]
    fn test_in_progress_state_not_resumable() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path());
        let target = dir.path().join("pkg.bottle");
        std::fs::write(&target, b"partial").unwrap();

        let mut pd = store.create("https://example.com/pkg", &target).unwrap();
        pd.update_state(DownloadState::InProgress).unwrap();
        assert!(!can_resume_download(&pd, "", ""));
    }
}
