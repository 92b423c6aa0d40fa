//! On-disk catalog cache.
//!
//! The bulk formula and cask catalogs are fetched from the upstream API,
//! zstd-compressed and stored in the cache directory. Derived search
//! artifacts (the flat search corpus and the prefix index) are rebuilt
//! whenever they are older than the catalog they were derived from.
//!
//! Layout under `<cache>/`:
//! ```text
//! formula.json.zst    compressed formula catalog
//! cask.json.zst       compressed cask catalog
//! search.gob.zst      flat search corpus (bincode, compressed)
//! prefix_index.gob    prefix index (bincode)
//! ```

use crate::api::{RemoteCask, RemoteFormula};
use crate::codec::{self, CodecError};
use crate::error::{FastBrewError, Result};
use crate::http;
use crate::index::PrefixIndex;
use crate::retry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

pub const FORMULA_CATALOG_URL: &str = "https://formulae.brew.sh/api/formula.json";
pub const CASK_CATALOG_URL: &str = "https://formulae.brew.sh/api/cask.json";

const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The decoded catalog.
#[derive(Debug, Default)]
pub struct Index {
    pub formulae: Vec<RemoteFormula>,
    pub casks: Vec<RemoteCask>,
}

impl Index {
    pub fn formula_map(&self) -> HashMap<&str, &RemoteFormula> {
        self.formulae.iter().map(|f| (f.name.as_str(), f)).collect()
    }

    pub fn is_cask(&self, name: &str) -> bool {
        self.casks.iter().any(|c| c.token == name)
    }
}

/// Flattened search entry, one per catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub name: String,
    pub desc: String,
    pub is_cask: bool,
}

pub struct CatalogStore {
    cache_dir: PathBuf,
}

impl CatalogStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn formula_path(&self) -> PathBuf {
        self.cache_dir.join("formula.json.zst")
    }

    pub fn cask_path(&self) -> PathBuf {
        self.cache_dir.join("cask.json.zst")
    }

    pub fn search_path(&self) -> PathBuf {
        self.cache_dir.join("search.gob.zst")
    }

    pub fn prefix_index_path(&self) -> PathBuf {
        self.cache_dir.join("prefix_index.gob")
    }

    /// Load the catalog, refreshing anything stale first. A corrupt
    /// cache file is deleted and fetched again once before giving up.
    pub async fn load_index(&self) -> Result<Index> {
        self.ensure_fresh().await?;
        match self.load_raw() {
            Ok(index) => Ok(index),
            Err(FastBrewError::CacheCorrupt { path, reason }) => {
                tracing::warn!(path = %path.display(), reason, "removing corrupt catalog cache");
                let _ = fs::remove_file(&path);
                self.ensure_fresh().await?;
                self.load_raw()
            }
            Err(e) => Err(e),
        }
    }

    /// Decode whatever is on disk without touching the network.
    pub fn load_raw(&self) -> Result<Index> {
        let mut index = Index {
            formulae: load_json(&self.formula_path())?,
            casks: Vec::new(),
        };
        // A missing cask catalog degrades search, not installs.
        index.casks = load_json(&self.cask_path()).unwrap_or_default();
        Ok(index)
    }

    /// Refresh any catalog older than 24 hours (or absent).
    pub async fn ensure_fresh(&self) -> Result<()> {
        if is_stale(&self.formula_path()) {
            self.download_catalog(FORMULA_CATALOG_URL, &self.formula_path())
                .await?;
        }
        if is_stale(&self.cask_path()) {
            self.download_catalog(CASK_CATALOG_URL, &self.cask_path())
                .await?;
        }
        Ok(())
    }

    /// Unconditional refresh of both catalogs plus a rebuild of the
    /// derived search artifacts. Used by `fastbrew update`.
    pub async fn force_refresh(&self) -> Result<()> {
        let formula_path = self.formula_path();
        let cask_path = self.cask_path();
        let (formulae, casks) = tokio::join!(
            self.download_catalog(FORMULA_CATALOG_URL, &formula_path),
            self.download_catalog(CASK_CATALOG_URL, &cask_path),
        );
        formulae?;
        casks?;

        let _ = fs::remove_file(self.search_path());
        let _ = fs::remove_file(self.prefix_index_path());
        self.search_items()?;
        Ok(())
    }

    async fn download_catalog(&self, url: &str, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let cancel = CancellationToken::new();
        let data = retry::with_retry(&cancel, || async {
            let response = http::client().get(url).send().await?;
            let status = response.status().as_u16();
            if status != 200 {
                return Err(FastBrewError::ApiStatus {
                    name: url.to_string(),
                    status,
                });
            }
            Ok(response.bytes().await?)
        })
        .await?;

        match codec::compress(&data) {
            Ok(compressed) => {
                tracing::debug!(
                    url,
                    original = data.len(),
                    compressed = compressed.len(),
                    "catalog compressed"
                );
                fs::write(path, compressed)?;
            }
            Err(CodecError::TooSmall(_)) => {
                fs::write(path, &data)?;
            }
            Err(e) => {
                return Err(FastBrewError::Other(anyhow::Error::new(e)));
            }
        }
        Ok(())
    }

    /// The flat search corpus, rebuilt when older than the catalog.
    ///
    /// Rebuilding also regenerates and persists the prefix index so both
    /// derived artifacts stay in lockstep with the catalog snapshot.
    pub fn search_items(&self) -> Result<Vec<SearchItem>> {
        let gob_path = self.search_path();
        let formula_path = self.formula_path();

        if is_fresh(&gob_path, &formula_path) && is_fresh(&self.prefix_index_path(), &formula_path)
        {
            if let Ok(data) = fs::read(&gob_path) {
                let raw = match codec::decompress(&data) {
                    Ok(decompressed) => decompressed,
                    Err(_) => data,
                };
                if let Ok(items) = bincode::deserialize::<Vec<SearchItem>>(&raw) {
                    return Ok(items);
                }
            }
        }

        let index = self.load_raw()?;
        let mut items = Vec::with_capacity(index.formulae.len() + index.casks.len());
        for f in &index.formulae {
            items.push(SearchItem {
                name: f.name.clone(),
                desc: f.desc.clone().unwrap_or_default(),
                is_cask: false,
            });
        }
        for c in &index.casks {
            items.push(SearchItem {
                name: c.token.clone(),
                desc: c.desc.clone().unwrap_or_default(),
                is_cask: true,
            });
        }

        if let Ok(encoded) = bincode::serialize(&items) {
            match codec::compress(&encoded) {
                Ok(compressed) => {
                    let _ = fs::write(&gob_path, compressed);
                }
                Err(_) => {
                    let _ = fs::write(&gob_path, &encoded);
                }
            }
        }

        let mut prefix_index = PrefixIndex::new();
        prefix_index.build(items.clone());
        if let Err(e) = prefix_index.save(&self.prefix_index_path()) {
            tracing::warn!(error = %e, "failed to persist prefix index");
        }

        Ok(items)
    }

    /// Load the persisted prefix index when fresh, otherwise rebuild it
    /// from the search corpus.
    pub fn prefix_index(&self) -> Result<PrefixIndex> {
        let path = self.prefix_index_path();

        if is_fresh(&path, &self.formula_path()) {
            if let Ok(index) = PrefixIndex::load(&path) {
                return Ok(index);
            }
        }

        let items = self.search_items()?;
        let mut index = PrefixIndex::new();
        index.build(items);
        if let Err(e) = index.save(&path) {
            tracing::warn!(error = %e, "failed to persist prefix index");
        }
        Ok(index)
    }
}

/// Stale when absent or older than the catalog TTL.
pub fn is_stale(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > CATALOG_TTL,
        Err(_) => false,
    }
}

/// A derived file is fresh only when strictly newer than its source.
pub fn is_fresh(target: &Path, source: &Path) -> bool {
    let target_mtime = fs::metadata(target).and_then(|m| m.modified());
    let source_mtime = fs::metadata(source).and_then(|m| m.modified());
    match (target_mtime, source_mtime) {
        (Ok(t), Ok(s)) => t > s,
        _ => false,
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    let raw = match codec::decompress(&data) {
        Ok(decompressed) => decompressed,
        // Small catalogs are stored uncompressed.
        Err(_) => data,
    };
    serde_json::from_slice(&raw).map_err(|e| FastBrewError::CacheCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Validation status of one cache artifact.
#[derive(Debug)]
pub struct CacheStatus {
    pub path: PathBuf,
    pub valid: bool,
    pub size: u64,
    pub error: Option<String>,
}

/// Read-only integrity checks over the cache artifacts; doctor reports
/// these, only the corruption checker deletes.
pub struct CacheValidator {
    store: CatalogStore,
}

impl CacheValidator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: CatalogStore::new(cache_dir),
        }
    }

    pub fn validate_all(&self) -> Vec<CacheStatus> {
        vec![
            self.validate_json(&self.store.formula_path()),
            self.validate_json(&self.store.cask_path()),
            self.validate_bincode(&self.store.search_path()),
        ]
    }

    fn validate_json(&self, path: &Path) -> CacheStatus {
        let mut status = CacheStatus {
            path: path.to_path_buf(),
            valid: false,
            size: 0,
            error: None,
        };

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                status.error = Some(format!("failed to read: {e}"));
                return status;
            }
        };
        status.size = data.len() as u64;

        let raw = match codec::decompress(&data) {
            Ok(raw) => raw,
            Err(_) => data,
        };

        match serde_json::from_slice::<serde_json::Value>(&raw) {
            Ok(_) => status.valid = true,
            Err(e) => status.error = Some(format!("json validation failed: {e}")),
        }
        status
    }

    fn validate_bincode(&self, path: &Path) -> CacheStatus {
        let mut status = CacheStatus {
            path: path.to_path_buf(),
            valid: false,
            size: 0,
            error: None,
        };

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                status.error = Some(format!("failed to read: {e}"));
                return status;
            }
        };
        status.size = data.len() as u64;

        let raw = match codec::decompress(&data) {
            Ok(raw) => raw,
            Err(_) => data,
        };

        match bincode::deserialize::<Vec<SearchItem>>(&raw) {
            Ok(_) => status.valid = true,
            Err(e) => status.error = Some(format!("decode failed: {e}")),
        }
        status
    }
}

/// Deletes cache artifacts that fail validation so the next load
/// refetches them.
pub struct CorruptionChecker {
    cache_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct CorruptionReport {
    pub corrupted: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl CorruptionChecker {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn check_and_repair(&self) -> CorruptionReport {
        let mut report = CorruptionReport::default();
        let validator = CacheValidator::new(&self.cache_dir);

        for status in validator.validate_all() {
            if status.valid || !status.path.exists() {
                continue;
            }
            report.corrupted.push(status.path.clone());
            match fs::remove_file(&status.path) {
                Ok(()) => report.removed.push(status.path),
                Err(e) => report
                    .errors
                    .push(format!("failed to remove {}: {e}", status.path.display())),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_catalog(store: &CatalogStore, formulae_json: &str) {
        fs::create_dir_all(store.formula_path().parent().unwrap()).unwrap();
        // Pad the payload past the compression floor the way the real
        // catalog always is.
        let padded = format!(
            "{formulae_json}{}",
            " ".repeat(codec::MIN_COMPRESS_SIZE)
        );
        let compressed = codec::compress(padded.as_bytes()).unwrap();
        fs::write(store.formula_path(), compressed).unwrap();
    }

    #[test]
    fn test_load_raw_decompresses() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(
            &store,
            r#"[{"name": "cowsay", "desc": "Talking cow", "versions": {"stable": "3.04"}}]"#,
        );

        let index = store.load_raw().unwrap();
        assert_eq!(index.formulae.len(), 1);
        assert_eq!(index.formulae[0].name, "cowsay");
        assert!(index.casks.is_empty());
    }

    #[test]
    fn test_load_raw_accepts_uncompressed() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.formula_path(), r#"[{"name": "tiny"}]"#).unwrap();

        let index = store.load_raw().unwrap();
        assert_eq!(index.formulae[0].name, "tiny");
    }

    #[test]
    fn test_corrupt_catalog_reported() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.formula_path(), b"{not json at all").unwrap();

        assert!(matches!(
            store.load_raw(),
            Err(FastBrewError::CacheCorrupt { .. })
        ));

        let report = CorruptionChecker::new(dir.path()).check_and_repair();
        assert_eq!(report.removed.len(), 1);
        assert!(!store.formula_path().exists());
    }

    #[test]
    fn test_search_items_derivation_and_freshness() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(
            &store,
            r#"[{"name": "wget", "desc": "Internet file retriever"},
                {"name": "ripgrep", "desc": "Search tool"}]"#,
        );

        let items = store.search_items().unwrap();
        assert_eq!(items.len(), 2);
        assert!(store.search_path().exists());
        assert!(store.prefix_index_path().exists());

        // Derived artifacts must be strictly newer than the catalog.
        assert!(is_fresh(&store.search_path(), &store.formula_path()));
        assert!(is_fresh(&store.prefix_index_path(), &store.formula_path()));

        // A second call reads the persisted corpus.
        let again = store.search_items().unwrap();
        assert_eq!(again, items);
    }

    #[test]
    fn test_is_stale_missing_file() {
        assert!(is_stale(Path::new("/nonexistent/formula.json.zst")));
    }

    #[test]
    fn test_is_fresh_requires_strictly_newer() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        fs::write(&source, b"s").unwrap();

        assert!(!is_fresh(&target, &source));

        fs::write(&target, b"t").unwrap();
        let newer = SystemTime::now() + Duration::from_secs(5);
        let file = fs::File::open(&target).unwrap();
        file.set_modified(newer).unwrap();
        assert!(is_fresh(&target, &source));
    }

    #[test]
    fn test_validator_statuses() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, r#"[{"name": "ok"}]"#);

        let statuses = CacheValidator::new(dir.path()).validate_all();
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].valid);
        // Cask catalog and search corpus were never written.
        assert!(!statuses[1].valid);
        assert!(!statuses[2].valid);
    }
}
