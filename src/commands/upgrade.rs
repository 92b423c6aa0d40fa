use crate::client::Client;
use crate::commands;
use crate::config;
use crate::error::Result;
use crate::outdated;
use crate::pipeline;
use crate::resolver;
use colored::Colorize;
use std::process::Command;
use tokio_util::sync::CancellationToken;

/// Upgrade outdated packages, honoring the pinned file. With explicit
/// names, only those packages are considered.
pub async fn upgrade(client: &Client, names: &[String], progress: bool) -> Result<()> {
    let pinned = config::load_pinned()?;

    println!("{} Checking for outdated packages...", "🔍".normal());
    let mut outdated = outdated::get_outdated(client).await?;

    if !names.is_empty() {
        outdated.retain(|pkg| names.contains(&pkg.name));
    }

    let skipped: Vec<&str> = outdated
        .iter()
        .filter(|pkg| pinned.contains(&pkg.name))
        .map(|pkg| pkg.name.as_str())
        .collect();
    for name in &skipped {
        println!("  {} Skipping pinned package: {}", "⏭".normal(), name.bold());
    }
    outdated.retain(|pkg| !pinned.contains(&pkg.name));

    if outdated.is_empty() {
        println!("{} All packages up to date.", "✓".green());
        return Ok(());
    }

    let (formulae, casks): (Vec<_>, Vec<_>) = outdated.into_iter().partition(|pkg| !pkg.is_cask);

    if !formulae.is_empty() {
        println!(
            "\n{} {} formula(e) to upgrade:",
            "📦".normal(),
            formulae.len().to_string().bold()
        );
        for pkg in &formulae {
            println!(
                "  {} {} → {}",
                pkg.name.cyan(),
                pkg.current_version.dimmed(),
                pkg.new_version.bold()
            );
        }

        let cancel = commands::install::cancel_on_ctrl_c();
        let (manager, renderer) = commands::spawn_renderer(progress);

        let result = upgrade_formulae(
            client,
            formulae.iter().map(|p| p.name.clone()).collect(),
            manager.clone(),
            &cancel,
        )
        .await;
        commands::stop_renderer(manager, renderer);
        let report = result?;

        if !report.installed.is_empty() {
            println!(
                "{} Upgraded {} package(s)",
                "✓".green().bold(),
                report.installed.len().to_string().bold()
            );
        }
        commands::install::print_conflicts(&report.conflicts);

        if !report.ok() {
            return Err(crate::error::FastBrewError::PartialFailure {
                phase: "upgrade",
                failed: report.failed.len(),
                total: report.failed.len() + report.installed.len(),
            });
        }

        if client.config.auto_cleanup {
            let removed = crate::cleanup::run(client)?;
            if !removed.removed_versions.is_empty() {
                println!(
                    "{} Cleaned up {} old version(s)",
                    "🧹".normal(),
                    removed.removed_versions.len()
                );
            }
        }
    }

    if !casks.is_empty() {
        println!("\n{} Upgrading {} cask(s) via brew...", "🍷".normal(), casks.len());
        let names: Vec<&str> = casks.iter().map(|pkg| pkg.name.as_str()).collect();
        let status = Command::new("brew")
            .arg("upgrade")
            .arg("--cask")
            .args(&names)
            .status()?;
        if !status.success() {
            return Err(crate::error::FastBrewError::Other(anyhow::anyhow!(
                "cask upgrade failed with status {status}"
            )));
        }
    }

    Ok(())
}

/// Phased upgrade for formulae: metadata, then the shared
/// download/extract/link pipeline in dependency order.
async fn upgrade_formulae(
    client: &Client,
    names: Vec<String>,
    manager: Option<std::sync::Arc<crate::progress::ProgressManager>>,
    cancel: &CancellationToken,
) -> Result<pipeline::InstallReport> {
    let details = pipeline::fetch_metadata(client, &names, cancel).await?;
    let order = resolver::install_order(&details, &names);
    let queue = order
        .iter()
        .filter_map(|name| details.get(name))
        .cloned()
        .collect();

    pipeline::run_phases(client, queue, manager, cancel).await
}
