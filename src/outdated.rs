//! Outdated detection: join the installed set against the catalog.
//!
//! The cached catalog answers most packages instantly; anything it
//! doesn't know about falls back to a bounded pool of direct API
//! lookups. Version comparison is string equality after stripping the
//! bottle revision suffix, matching the upstream catalog's notion of a
//! stable version.

use crate::cellar::{self, strip_revision};
use crate::client::Client;
use crate::error::Result;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Parallelism for the unknown-package fallback lookups.
const FALLBACK_WORKERS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct OutdatedPackage {
    pub name: String,
    pub current_version: String,
    pub new_version: String,
    pub is_cask: bool,
}

/// All installed packages whose catalog version differs from the
/// installed one.
pub async fn get_outdated(client: &Client) -> Result<Vec<OutdatedPackage>> {
    let mut installed = cellar::list_installed(&client.cellar)?;
    installed.extend(cellar::list_installed_casks());

    if installed.is_empty() {
        return Ok(Vec::new());
    }

    let index = client.catalog().load_index().await?;

    let formula_versions: HashMap<&str, &str> = index
        .formulae
        .iter()
        .filter_map(|f| Some((f.name.as_str(), f.versions.stable.as_deref()?)))
        .collect();
    let cask_versions: HashMap<&str, &str> = index
        .casks
        .iter()
        .filter_map(|c| Some((c.token.as_str(), c.version.as_deref()?)))
        .collect();

    let mut outdated = Vec::new();
    let mut unknown = Vec::new();

    for pkg in installed {
        let installed_base = strip_revision(&pkg.version).to_string();
        let latest = if pkg.is_cask {
            cask_versions.get(pkg.name.as_str())
        } else {
            formula_versions.get(pkg.name.as_str())
        };

        match latest {
            Some(latest) => {
                if *latest != installed_base {
                    outdated.push(OutdatedPackage {
                        name: pkg.name,
                        current_version: pkg.version,
                        new_version: latest.to_string(),
                        is_cask: pkg.is_cask,
                    });
                }
            }
            None => unknown.push(pkg),
        }
    }

    // Fallback: direct API lookups for packages missing from the
    // cached catalog (taps, renames, very fresh formulae).
    if !unknown.is_empty() {
        let semaphore = Arc::new(Semaphore::new(FALLBACK_WORKERS));
        let lookups = unknown.into_iter().map(|pkg| {
            let api = client.api.clone();
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await;
                let installed_base = strip_revision(&pkg.version).to_string();

                if pkg.is_cask {
                    let cask = api.fetch_cask(&pkg.name).await.ok()?;
                    let latest = cask.version?;
                    (latest != installed_base).then(|| OutdatedPackage {
                        name: pkg.name,
                        current_version: pkg.version,
                        new_version: latest,
                        is_cask: true,
                    })
                } else {
                    let formula = api.fetch_formula(&pkg.name).await.ok()?;
                    let latest = formula.versions.stable?;
                    (latest != installed_base).then(|| OutdatedPackage {
                        name: pkg.name,
                        current_version: pkg.version,
                        new_version: latest,
                        is_cask: false,
                    })
                }
            }
        });

        outdated.extend(join_all(lookups).await.into_iter().flatten());
    }

    Ok(outdated)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The join logic itself is pure; exercise it through the same
    // comparison the async path uses.
    fn is_outdated(installed: &str, catalog: &str) -> bool {
        strip_revision(installed) != catalog
    }

    #[test]
    fn test_revision_suffix_not_outdated() {
        assert!(!is_outdated("1.4.0_2", "1.4.0"));
        assert!(!is_outdated("1.4.0", "1.4.0"));
    }

    #[test]
    fn test_newer_catalog_is_outdated() {
        assert!(is_outdated("1.4.0", "1.5.0"));
        assert!(is_outdated("1.4.0_31", "1.4.1"));
    }

    #[test]
    fn test_string_equality_semantics_preserved() {
        // Deliberate: "1.0" vs "1.0.0" count as different versions.
        assert!(is_outdated("1.0", "1.0.0"));
    }
}
