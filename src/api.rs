//! Typed access to the formulae.brew.sh JSON API.
//!
//! Single-package lookups go through the shared HTTP client and are
//! memoized in-process with moka so dependency resolution never fetches
//! the same formula twice in one run. The bulk catalog endpoints are
//! handled by the on-disk cache in [`crate::cache`].

use crate::error::{FastBrewError, Result};
use crate::http;
use crate::platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const FORMULA_API: &str = "https://formulae.brew.sh/api/formula";
pub const CASK_API: &str = "https://formulae.brew.sh/api/cask";

/// Full formula record from the per-package endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFormula {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub versions: Versions,
    #[serde(default)]
    pub bottle: Bottle,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub keg_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub stable: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bottle {
    #[serde(default)]
    pub stable: Option<BottleStable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BottleStable {
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub files: HashMap<String, BottleFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleFile {
    #[serde(default)]
    pub cellar: String,
    pub url: String,
    pub sha256: String,
}

/// Cask record from the per-package endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCask {
    pub token: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl RemoteFormula {
    pub fn stable_version(&self) -> Result<&str> {
        self.versions
            .stable
            .as_deref()
            .ok_or_else(|| FastBrewError::UnknownPackage(format!("{} has no stable version", self.name)))
    }

    /// Pick the bottle for the current platform, walking the macOS
    /// fallback chain and finally the universal "all" bottle.
    pub fn bottle_for_platform(&self, platform: &str) -> Result<&BottleFile> {
        let files = match self.bottle.stable.as_ref() {
            Some(stable) => &stable.files,
            None => {
                return Err(FastBrewError::NoBottleForPlatform {
                    name: self.name.clone(),
                    platform: platform.to_string(),
                    available: String::new(),
                });
            }
        };

        if let Some(file) = files.get(platform) {
            return Ok(file);
        }

        for candidate in platform::fallback_tags(platform) {
            if let Some(file) = files.get(&candidate) {
                return Ok(file);
            }
        }

        if let Some(file) = files.get("all") {
            return Ok(file);
        }

        let mut available: Vec<&str> = files.keys().map(String::as_str).collect();
        available.sort_unstable();
        Err(FastBrewError::NoBottleForPlatform {
            name: self.name.clone(),
            platform: platform.to_string(),
            available: available.join(", "),
        })
    }
}

/// API client with per-run memoization of package lookups.
#[derive(Clone)]
pub struct BrewApi {
    formula_cache: moka::future::Cache<String, RemoteFormula>,
    cask_cache: moka::future::Cache<String, RemoteCask>,
}

impl BrewApi {
    pub fn new() -> Self {
        Self {
            formula_cache: moka::future::Cache::new(1000),
            cask_cache: moka::future::Cache::new(500),
        }
    }

    /// Fetch metadata for a single formula.
    pub async fn fetch_formula(&self, name: &str) -> Result<RemoteFormula> {
        if let Some(cached) = self.formula_cache.get(name).await {
            return Ok(cached);
        }

        let url = format!("{FORMULA_API}/{name}.json");
        let response = http::client().get(&url).send().await?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(FastBrewError::UnknownPackage(name.to_string())),
            status => {
                return Err(FastBrewError::ApiStatus {
                    name: name.to_string(),
                    status,
                });
            }
        }

        let formula: RemoteFormula = response.json().await?;
        self.formula_cache
            .insert(name.to_string(), formula.clone())
            .await;
        Ok(formula)
    }

    /// Fetch metadata for a single cask.
    pub async fn fetch_cask(&self, token: &str) -> Result<RemoteCask> {
        if let Some(cached) = self.cask_cache.get(token).await {
            return Ok(cached);
        }

        let url = format!("{CASK_API}/{token}.json");
        let response = http::client().get(&url).send().await?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(FastBrewError::UnknownPackage(token.to_string())),
            status => {
                return Err(FastBrewError::ApiStatus {
                    name: token.to_string(),
                    status,
                });
            }
        }

        let cask: RemoteCask = response.json().await?;
        self.cask_cache.insert(token.to_string(), cask.clone()).await;
        Ok(cask)
    }
}

impl Default for BrewApi {
    fn default() -> Self {
        Self::new()
    }
}
