//! Dependency resolution over the cached catalog.
//!
//! The catalog induces a directed graph over formula names. Closure and
//! ordering both carry a visited set so a cycle in bad data terminates
//! instead of recursing forever.

use crate::api::RemoteFormula;
use crate::cache::Index;
use crate::error::{FastBrewError, Result};
use std::collections::{HashMap, HashSet};

/// Names requested on the command line, split by catalog kind.
#[derive(Debug, Default)]
pub struct Classified {
    pub formulae: Vec<String>,
    pub casks: Vec<String>,
}

/// Classify requested names as formulae or casks. A name in neither
/// catalog aborts the request.
pub fn classify(index: &Index, names: &[String]) -> Result<Classified> {
    let formula_names: HashSet<&str> = index.formulae.iter().map(|f| f.name.as_str()).collect();

    let mut classified = Classified::default();
    for name in names {
        if formula_names.contains(name.as_str()) {
            classified.formulae.push(name.clone());
        } else if index.is_cask(name) {
            classified.casks.push(name.clone());
        } else {
            return Err(FastBrewError::UnknownPackage(name.clone()));
        }
    }
    Ok(classified)
}

/// Names needing installation: the requested formulae plus every
/// transitive dependency that is not already installed. Installed
/// packages are short-circuited, but their missing dependencies are
/// still pulled in.
pub fn closure(
    index: &Index,
    requested: &[String],
    is_installed: &dyn Fn(&str) -> bool,
) -> Result<Vec<String>> {
    let formula_map = index.formula_map();
    let mut needed: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    fn visit(
        name: &str,
        formula_map: &HashMap<&str, &RemoteFormula>,
        is_installed: &dyn Fn(&str) -> bool,
        seen: &mut HashSet<String>,
        needed: &mut Vec<String>,
    ) -> Result<()> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }

        let Some(formula) = formula_map.get(name) else {
            return Err(FastBrewError::UnknownPackage(name.to_string()));
        };

        let installed = is_installed(name);
        if !installed {
            needed.push(name.to_string());
        }

        for dep in &formula.dependencies {
            // Installed packages still get their own missing deps pulled in.
            if formula_map.contains_key(dep.as_str()) {
                visit(dep, formula_map, is_installed, seen, needed)?;
            } else if !is_installed(dep) {
                return Err(FastBrewError::UnknownPackage(dep.clone()));
            }
        }
        Ok(())
    }

    for name in requested {
        visit(name, &formula_map, is_installed, &mut seen, &mut needed)?;
    }

    Ok(needed)
}

/// Full recursive dependency list (dependencies only, requested names
/// excluded), deduplicated in discovery order. Used by `fastbrew deps`.
pub fn resolve_deps(index: &Index, requested: &[String]) -> Vec<String> {
    let formula_map = index.formula_map();
    let mut visited: HashSet<String> = HashSet::new();
    let mut deps: Vec<String> = Vec::new();

    fn visit(
        name: &str,
        formula_map: &HashMap<&str, &RemoteFormula>,
        visited: &mut HashSet<String>,
        deps: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(formula) = formula_map.get(name) else {
            return;
        };
        for dep in &formula.dependencies {
            visit(dep, formula_map, visited, deps);
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.clone());
            }
        }
    }

    for name in requested {
        visit(name, &formula_map, &mut visited, &mut deps);
    }

    deps
}

/// Topological install order (DFS post-order): every dependency
/// precedes its dependents. Operates on the fully fetched formula
/// records so the queue carries bottle metadata.
pub fn install_order(
    details: &HashMap<String, RemoteFormula>,
    requested: &[String],
) -> Vec<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = Vec::new();

    fn visit(
        name: &str,
        details: &HashMap<String, RemoteFormula>,
        visited: &mut HashSet<String>,
        queue: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(formula) = details.get(name) else {
            return;
        };
        for dep in &formula.dependencies {
            visit(dep, details, visited, queue);
        }
        queue.push(name.to_string());
    }

    for name in requested {
        visit(name, details, &mut visited, &mut queue);
    }

    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Bottle, Versions};

    fn formula(name: &str, deps: &[&str]) -> RemoteFormula {
        RemoteFormula {
            name: name.to_string(),
            desc: None,
            homepage: None,
            versions: Versions {
                stable: Some("1.0".into()),
            },
            bottle: Bottle::default(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            keg_only: false,
        }
    }

    fn index(formulae: Vec<RemoteFormula>) -> Index {
        Index {
            formulae,
            casks: vec![],
        }
    }

    #[test]
    fn test_closure_includes_transitive_deps() {
        let idx = index(vec![
            formula("wget", &["openssl@3", "libidn2"]),
            formula("openssl@3", &["ca-certificates"]),
            formula("libidn2", &[]),
            formula("ca-certificates", &[]),
        ]);

        let needed = closure(&idx, &["wget".into()], &|_| false).unwrap();
        let set: HashSet<&str> = needed.iter().map(String::as_str).collect();
        assert_eq!(
            set,
            HashSet::from(["wget", "openssl@3", "libidn2", "ca-certificates"])
        );
    }

    #[test]
    fn test_closure_skips_installed_but_checks_their_deps() {
        let idx = index(vec![
            formula("wget", &["openssl@3"]),
            formula("openssl@3", &["ca-certificates"]),
            formula("ca-certificates", &[]),
        ]);

        // openssl@3 is installed but its dependency is missing.
        let needed = closure(&idx, &["wget".into()], &|name| name == "openssl@3").unwrap();
        let set: HashSet<&str> = needed.iter().map(String::as_str).collect();
        assert_eq!(set, HashSet::from(["wget", "ca-certificates"]));
    }

    #[test]
    fn test_closure_unknown_package_fails() {
        let idx = index(vec![formula("a", &[])]);
        assert!(matches!(
            closure(&idx, &["ghost".into()], &|_| false),
            Err(FastBrewError::UnknownPackage(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let idx = index(vec![formula("a", &["b"]), formula("b", &["a"])]);
        let needed = closure(&idx, &["a".into()], &|_| false).unwrap();
        assert_eq!(needed.len(), 2);
    }

    #[test]
    fn test_install_order_is_topological() {
        let mut details = HashMap::new();
        details.insert("wget".to_string(), formula("wget", &["openssl@3"]));
        details.insert(
            "openssl@3".to_string(),
            formula("openssl@3", &["ca-certificates"]),
        );
        details.insert(
            "ca-certificates".to_string(),
            formula("ca-certificates", &[]),
        );

        let order = install_order(&details, &["wget".into()]);
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("ca-certificates") < pos("openssl@3"));
        assert!(pos("openssl@3") < pos("wget"));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_install_order_no_duplicates_with_shared_deps() {
        let mut details = HashMap::new();
        details.insert("a".to_string(), formula("a", &["common"]));
        details.insert("b".to_string(), formula("b", &["common"]));
        details.insert("common".to_string(), formula("common", &[]));

        let order = install_order(&details, &["a".into(), "b".into()]);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "common");
    }

    #[test]
    fn test_resolve_deps_excludes_requested() {
        let idx = index(vec![
            formula("wget", &["openssl@3"]),
            formula("openssl@3", &[]),
        ]);
        let deps = resolve_deps(&idx, &["wget".into()]);
        assert_eq!(deps, vec!["openssl@3"]);
    }

    #[test]
    fn test_classify_splits_formulae_and_casks() {
        use crate::api::RemoteCask;
        let mut idx = index(vec![formula("wget", &[])]);
        idx.casks.push(RemoteCask {
            token: "firefox".into(),
            desc: None,
            homepage: None,
            version: Some("130".into()),
        });

        let classified =
            classify(&idx, &["wget".to_string(), "firefox".to_string()]).unwrap();
        assert_eq!(classified.formulae, vec!["wget"]);
        assert_eq!(classified.casks, vec!["firefox"]);

        assert!(classify(&idx, &["ghost".to_string()]).is_err());
    }
}
