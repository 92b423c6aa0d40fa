//! Four-phase install orchestration: metadata, download, extract, link.
//!
//! Phases run strictly in order; within a phase, packages proceed in
//! parallel bounded by the configured download parallelism. Failures
//! are collected per package so one broken bottle never aborts its
//! siblings, and a cancellation token is observed at every task
//! submission boundary.

use crate::api::RemoteFormula;
use crate::cellar;
use crate::client::Client;
use crate::download;
use crate::error::{FastBrewError, Result};
use crate::extract;
use crate::progress::ProgressManager;
use crate::resolver;
use crate::retry;
use crate::symlink::{self, ConflictTracker, LinkConflict};
use colored::Colorize;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Workers used for the conflict-free link phase.
const LINK_WORKERS: usize = 5;

/// What happened to each package in a run.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub conflicts: Vec<LinkConflict>,
}

impl InstallReport {
    pub fn ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Install the requested packages. Casks are delegated to the host
/// package manager; formulae run through the native pipeline.
pub async fn install(
    client: &Client,
    names: &[String],
    progress: Option<Arc<ProgressManager>>,
    cancel: &CancellationToken,
) -> Result<InstallReport> {
    let index = client.catalog().load_index().await?;
    let classified = resolver::classify(&index, names)?;

    if !classified.casks.is_empty() {
        delegate_cask_install(&classified.casks)?;
    }
    if classified.formulae.is_empty() {
        return Ok(InstallReport::default());
    }

    let needed = resolver::closure(&index, &classified.formulae, &|name| {
        client.is_installed(name)
    })?;

    if needed.is_empty() {
        println!("{} All formulae already installed.", "✓".green());
        return Ok(InstallReport::default());
    }

    let details = fetch_metadata(client, &needed, cancel).await?;
    let order = resolver::install_order(&details, &classified.formulae);
    let queue: Vec<RemoteFormula> = order
        .iter()
        .filter_map(|name| details.get(name))
        .filter(|f| !client.is_installed(&f.name))
        .cloned()
        .collect();

    run_phases(client, queue, progress, cancel).await
}

/// Download, extract and link an already-ordered queue. Shared by
/// install and upgrade.
pub async fn run_phases(
    client: &Client,
    queue: Vec<RemoteFormula>,
    progress: Option<Arc<ProgressManager>>,
    cancel: &CancellationToken,
) -> Result<InstallReport> {
    let mut report = InstallReport::default();
    if queue.is_empty() {
        return Ok(report);
    }

    // Phase 2: download all bottles in parallel.
    println!(
        "{} Downloading {} bottle(s)...",
        "⬇".cyan(),
        queue.len().to_string().bold()
    );
    let results = download::download_bottles(
        &queue,
        &client.cache_dir,
        client.config.parallel_downloads(),
        progress.as_ref(),
        cancel,
    )
    .await;

    let mut downloaded: Vec<(RemoteFormula, PathBuf)> = Vec::new();
    for (name, result) in results {
        match result {
            Ok(path) => {
                if let Some(formula) = queue.iter().find(|f| f.name == name) {
                    downloaded.push((formula.clone(), path));
                }
            }
            Err(FastBrewError::Cancelled) => return Err(FastBrewError::Cancelled),
            Err(e) => {
                println!("  {} {name}: {e}", "✗".red());
                report.failed.push((name, e.to_string()));
            }
        }
    }

    if downloaded.is_empty() {
        return finish(report, "download", queue.len());
    }

    // Phase 3: extract in parallel into staging dirs, then rename.
    println!(
        "{} Extracting {} bottle(s)...",
        "📦".normal(),
        downloaded.len().to_string().bold()
    );
    let semaphore = Arc::new(Semaphore::new(client.config.parallel_downloads()));
    let mut tasks = Vec::new();

    for (formula, tar_path) in downloaded {
        if cancel.is_cancelled() {
            return Err(FastBrewError::Cancelled);
        }
        let semaphore = semaphore.clone();
        let cellar = client.cellar.clone();
        let prefix = client.prefix.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let name = formula.name.clone();
            let result = tokio::task::spawn_blocking(move || {
                extract_and_install(&formula, &tar_path, &cellar, &prefix).map(|()| formula)
            })
            .await
            .unwrap_or_else(|e| Err(FastBrewError::Other(anyhow::anyhow!("task panicked: {e}"))));
            (name, result)
        }));
    }

    let mut extracted: Vec<RemoteFormula> = Vec::new();
    for task in tasks {
        match task.await {
            Ok((_, Ok(formula))) => extracted.push(formula),
            Ok((name, Err(e))) => {
                println!("  {} {name}: {e}", "✗".red());
                report.failed.push((name, e.to_string()));
            }
            Err(e) => report.failed.push((String::new(), format!("task panicked: {e}"))),
        }
    }

    if extracted.is_empty() {
        return finish(report, "extract", queue.len());
    }

    // Phase 4: three-phase link.
    println!("{} Linking binaries...", "🔗".normal());
    let link_report = link_parallel(client, &extracted, cancel).await?;
    report.conflicts = link_report.conflicts;
    for (name, error) in link_report.errors {
        report.failed.push((name, error));
    }

    for formula in &extracted {
        if !report.failed.iter().any(|(name, _)| name == &formula.name) {
            report.installed.push(formula.name.clone());
        }
    }

    finish(report, "install", queue.len())
}

fn finish(
    report: InstallReport,
    phase: &'static str,
    total: usize,
) -> Result<InstallReport> {
    if report.installed.is_empty() && !report.failed.is_empty() {
        return Err(FastBrewError::PartialFailure {
            phase,
            failed: report.failed.len(),
            total,
        });
    }
    Ok(report)
}

/// Phase 1: fetch full formula records in parallel with retries.
pub async fn fetch_metadata(
    client: &Client,
    names: &[String],
    cancel: &CancellationToken,
) -> Result<HashMap<String, RemoteFormula>> {
    println!(
        "{} Fetching metadata for {} formula(e)...",
        "🔍".normal(),
        names.len().to_string().bold()
    );

    let semaphore = Arc::new(Semaphore::new(client.config.parallel_downloads()));
    let mut tasks = Vec::new();

    for name in names {
        if cancel.is_cancelled() {
            return Err(FastBrewError::Cancelled);
        }
        let api = client.api.clone();
        let name = name.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result =
                retry::with_retry(&cancel, || async { api.fetch_formula(&name).await }).await;
            (name, result)
        }));
    }

    let mut details = HashMap::new();
    for task in tasks {
        let (name, result) = task
            .await
            .map_err(|e| FastBrewError::Other(anyhow::anyhow!("task panicked: {e}")))?;
        details.insert(name, result?);
    }
    Ok(details)
}

/// Extract one bottle into a staging directory inside the Cellar, then
/// atomically rename it into `<Cellar>/<name>/<version>`. The staging
/// tree is removed on any failure so retries start clean.
pub fn extract_and_install(
    formula: &RemoteFormula,
    tar_path: &Path,
    cellar: &Path,
    prefix: &Path,
) -> Result<()> {
    let version = formula.stable_version()?;
    fs::create_dir_all(cellar)?;

    let staging = cellar.join(format!(
        ".fastbrew-tmp-{}-{}",
        formula.name,
        rand::thread_rng().gen_range(0..1_000_000u32)
    ));
    fs::create_dir_all(&staging)?;

    let result = (|| -> Result<()> {
        extract::extract_bottle(tar_path, &staging, prefix)?;

        // The tarball lays out <name>/<version>/...; tolerate a single
        // nested directory pair with unexpected names (bottle revisions).
        let mut extracted = staging.join(&formula.name).join(version);
        if !extracted.exists() {
            if let Some(nested) = single_nested_dir(&staging) {
                extracted = nested;
            }
        }
        if !extracted.exists() {
            return Err(FastBrewError::ExtractionUnsafe(format!(
                "no {}/{} tree found in bottle",
                formula.name, version
            )));
        }

        let final_pkg_dir = cellar.join(&formula.name);
        fs::create_dir_all(&final_pkg_dir)?;

        let final_version_dir = final_pkg_dir.join(version);
        if final_version_dir.exists() {
            fs::remove_dir_all(&final_version_dir)?;
        }
        fs::rename(&extracted, &final_version_dir)?;
        Ok(())
    })();

    let _ = fs::remove_dir_all(&staging);
    result
}

fn single_nested_dir(staging: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(staging).ok()?.filter_map(|e| e.ok());
    let first = entries.next()?;
    if entries.next().is_some() || !first.path().is_dir() {
        return None;
    }
    let mut inner = fs::read_dir(first.path()).ok()?.filter_map(|e| e.ok());
    let nested = inner.next()?;
    if inner.next().is_some() || !nested.path().is_dir() {
        return None;
    }
    Some(nested.path())
}

#[derive(Debug, Default)]
pub struct LinkPhaseReport {
    pub linked: usize,
    pub conflicts: Vec<LinkConflict>,
    pub errors: Vec<(String, String)>,
}

/// Three-phase link: detect conflicts with dry runs, link the
/// uncontested packages in parallel (their destination sets are
/// disjoint), then the contested ones sequentially with
/// first-writer-wins per path.
pub async fn link_parallel(
    client: &Client,
    queue: &[RemoteFormula],
    cancel: &CancellationToken,
) -> Result<LinkPhaseReport> {
    let mut report = LinkPhaseReport::default();
    let mut tracker = ConflictTracker::new();

    // Phase one: enumerate every link each install would create.
    let linkable: Vec<&RemoteFormula> = queue.iter().filter(|f| !f.keg_only).collect();
    for formula in &linkable {
        let version = formula.stable_version()?;
        let dry = symlink::link_keg_dry_run(&client.prefix, &client.cellar, &formula.name, version)?;
        for link in &dry.links {
            tracker.check_and_track(link, &formula.name);
        }
    }

    for formula in queue.iter().filter(|f| f.keg_only) {
        // Keg-only formulae still get their opt link.
        let version = formula.stable_version()?;
        let keg = cellar::keg_path(&client.cellar, &formula.name, version);
        symlink::create_opt_link(&client.prefix, &keg, &formula.name)?;
        println!(
            "  {} {} is keg-only, not linked into the prefix",
            "ℹ".cyan(),
            formula.name
        );
    }

    let contested = tracker.conflicting_packages();
    let (parallel_queue, sequential_queue): (Vec<_>, Vec<_>) = linkable
        .into_iter()
        .partition(|f| !contested.contains(&f.name));

    // Phase two: disjoint packages in parallel.
    if !parallel_queue.is_empty() {
        let semaphore = Arc::new(Semaphore::new(LINK_WORKERS));
        let mut tasks = Vec::new();

        for formula in parallel_queue {
            if cancel.is_cancelled() {
                return Err(FastBrewError::Cancelled);
            }
            let semaphore = semaphore.clone();
            let prefix = client.prefix.clone();
            let cellar_dir = client.cellar.clone();
            let name = formula.name.clone();
            let version = formula.stable_version()?.to_string();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tokio::task::spawn_blocking(move || {
                    let result = symlink::link_keg(&prefix, &cellar_dir, &name, &version);
                    (name, result)
                })
                .await
            }));
        }

        for task in tasks {
            match task.await {
                Ok(Ok((name, Ok(result)))) => {
                    if result.success() {
                        report.linked += 1;
                    } else {
                        report.errors.push((name, result.errors.join("; ")));
                    }
                }
                Ok(Ok((name, Err(e)))) => report.errors.push((name, e.to_string())),
                Ok(Err(e)) | Err(e) => {
                    report
                        .errors
                        .push((String::new(), format!("link task panicked: {e}")));
                }
            }
        }
    }

    // Phase three: contested packages one at a time. Seed the tracker
    // with the claims already linked in phase two so ownership is
    // consistent across both phases.
    if !sequential_queue.is_empty() {
        let mut sequential = ConflictTracker::new();
        for (path, owner) in tracker.tracked() {
            if !contested.contains(owner) {
                sequential.check_and_track(path, owner);
            }
        }

        for formula in sequential_queue {
            if cancel.is_cancelled() {
                return Err(FastBrewError::Cancelled);
            }
            let version = formula.stable_version()?;

            // First writer wins: paths an earlier keg already claimed
            // are skipped, everything else still gets linked.
            let dry =
                symlink::link_keg_dry_run(&client.prefix, &client.cellar, &formula.name, version)?;
            let mut skip = std::collections::HashSet::new();
            for link in &dry.links {
                if let Some(owner) = sequential.check_and_track(link, &formula.name) {
                    println!(
                        "  {} {} already provided by {}, keeping existing link",
                        "⚠".yellow(),
                        link.display().to_string().bold(),
                        owner
                    );
                    skip.insert(link.clone());
                }
            }

            match symlink::link_keg_skipping(
                &client.prefix,
                &client.cellar,
                &formula.name,
                version,
                &skip,
            ) {
                Ok(result) => {
                    if result.success() {
                        report.linked += 1;
                    } else {
                        report
                            .errors
                            .push((formula.name.clone(), result.errors.join("; ")));
                    }
                }
                Err(e) => report.errors.push((formula.name.clone(), e.to_string())),
            }
        }
    }

    report.conflicts = tracker.conflicts().to_vec();
    Ok(report)
}

/// Hand cask names to the host package manager.
pub fn delegate_cask_install(casks: &[String]) -> Result<()> {
    println!(
        "{} Delegating {} cask(s) to brew...",
        "🍷".normal(),
        casks.len().to_string().bold()
    );
    let status = std::process::Command::new("brew")
        .arg("install")
        .arg("--cask")
        .args(casks)
        .status()?;

    if !status.success() {
        return Err(FastBrewError::Other(anyhow::anyhow!(
            "cask installation failed with status {status}"
        )));
    }
    Ok(())
}
