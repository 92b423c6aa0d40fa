//! The top-level handle every command builds first.
//!
//! Bundles the detected prefix, the Cellar and cache locations, the API
//! client and the lazily-built prefix index. Tests construct one
//! against a temp directory instead of the real prefix.

use crate::api::BrewApi;
use crate::cache::{CatalogStore, SearchItem};
use crate::config::{self, Config};
use crate::error::Result;
use crate::index::{Match, PrefixIndex};
use crate::platform;
use std::path::PathBuf;
use std::sync::RwLock;

pub struct Client {
    pub prefix: PathBuf,
    pub cellar: PathBuf,
    pub cache_dir: PathBuf,
    pub config: Config,
    pub api: BrewApi,
    catalog: CatalogStore,
    prefix_index: RwLock<Option<PrefixIndex>>,
}

impl Client {
    /// Discover the prefix and build a client against the user's
    /// `~/.fastbrew` state directory.
    pub fn new() -> Result<Self> {
        let prefix = platform::detect_prefix();
        Ok(Self::with_paths(prefix, config::cache_dir()))
    }

    /// Explicit paths; used by tests and by anything operating on a
    /// non-default prefix.
    pub fn with_paths(prefix: PathBuf, cache_dir: PathBuf) -> Self {
        let cellar = prefix.join("Cellar");
        let catalog = CatalogStore::new(&cache_dir);
        Self {
            prefix,
            cellar,
            cache_dir,
            config: config::load().clone(),
            api: BrewApi::new(),
            catalog,
            prefix_index: RwLock::new(None),
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    /// Ranked search over the prefix index, loading or building the
    /// index on first use. Readers share the index; the build itself
    /// holds the write lock.
    pub fn search_fuzzy(&self, query: &str) -> Result<Vec<(SearchItem, i64)>> {
        {
            let guard = self.prefix_index.read().unwrap();
            if let Some(index) = guard.as_ref() {
                return Ok(Self::collect_matches(index, index.search_fuzzy(query)));
            }
        }

        let built = self.catalog.prefix_index()?;
        let mut guard = self.prefix_index.write().unwrap();
        let index = guard.get_or_insert(built);
        Ok(Self::collect_matches(index, index.search_fuzzy(query)))
    }

    fn collect_matches(index: &PrefixIndex, matches: Vec<Match>) -> Vec<(SearchItem, i64)> {
        matches
            .into_iter()
            .map(|m| (index.items()[m.index].clone(), m.score))
            .collect()
    }

    /// Drop the in-memory index so the next search reloads from disk.
    /// Called after `update` rebuilds the derived artifacts.
    pub fn invalidate_index(&self) {
        self.prefix_index.write().unwrap().take();
    }

    pub fn is_installed(&self, name: &str) -> bool {
        crate::cellar::is_installed(&self.cellar, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_paths_layout() {
        let dir = TempDir::new().unwrap();
        let client = Client::with_paths(dir.path().to_path_buf(), dir.path().join("cache"));
        assert_eq!(client.cellar, dir.path().join("Cellar"));
        assert!(!client.is_installed("wget"));
    }
}
