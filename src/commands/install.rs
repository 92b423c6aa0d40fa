use crate::client::Client;
use crate::commands;
use crate::error::Result;
use crate::pipeline;
use crate::symlink;
use crate::tap;
use colored::Colorize;
use std::fs;
use tokio_util::sync::CancellationToken;

pub async fn install(client: &Client, names: &[String], progress: bool) -> Result<()> {
    // Tap-qualified names (user/repo/formula) belong to the host
    // package manager; strip the core prefix from the rest.
    let (tap_names, core_names): (Vec<String>, Vec<String>) = names
        .iter()
        .cloned()
        .partition(|name| tap::is_tap_formula(name));

    for name in &tap_names {
        let code = commands::fallback_to_brew(&["install".to_string(), name.clone()]);
        if code != 0 {
            println!("  {} Failed to install {}", "✗".red(), name.bold());
        }
    }
    if core_names.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = core_names
        .into_iter()
        .map(|name| {
            name.strip_prefix("homebrew/core/")
                .map(str::to_string)
                .unwrap_or(name)
        })
        .collect();

    let (manager, renderer) = commands::spawn_renderer(progress);
    let cancel = cancel_on_ctrl_c();

    let report = pipeline::install(client, &names, manager.clone(), &cancel).await;
    commands::stop_renderer(manager, renderer);
    let report = report?;

    if !report.installed.is_empty() {
        println!(
            "{} Installed {} package(s)",
            "✓".green().bold(),
            report.installed.len().to_string().bold()
        );
    }
    print_conflicts(&report.conflicts);
    for (name, error) in &report.failed {
        println!("  {} {name}: {error}", "✗".red());
    }

    if !report.ok() {
        return Err(crate::error::FastBrewError::PartialFailure {
            phase: "install",
            failed: report.failed.len(),
            total: report.failed.len() + report.installed.len(),
        });
    }
    Ok(())
}

pub async fn reinstall(client: &Client, names: &[String], progress: bool) -> Result<()> {
    for name in names {
        if client.is_installed(name) {
            uninstall_one(client, name)?;
        }
    }
    install(client, names, progress).await
}

pub fn uninstall(client: &Client, names: &[String]) -> Result<()> {
    for name in names {
        if !client.is_installed(name) {
            println!("  {} {name} is not installed", "⚠".yellow());
            continue;
        }
        uninstall_one(client, name)?;
        println!("{} Uninstalled {}", "✓".green(), name.bold());
    }
    Ok(())
}

fn uninstall_one(client: &Client, name: &str) -> Result<()> {
    // Unlink first so no prefix symlink ever dangles, then drop the keg.
    symlink::unlink_keg(&client.prefix, &client.cellar, name)?;
    fs::remove_dir_all(client.cellar.join(name))?;
    Ok(())
}

pub fn print_conflicts(conflicts: &[symlink::LinkConflict]) {
    if conflicts.is_empty() {
        return;
    }
    println!("\n{} Link conflicts detected:", "⚠".yellow().bold());
    for conflict in conflicts {
        println!(
            "  • {} - claimed by {} and {}",
            conflict.path.display().to_string().bold(),
            conflict.first.cyan(),
            conflict.second.cyan()
        );
    }
    println!("  Resolve with: fastbrew unlink <formula> && fastbrew link <formula>");
}

/// A token that trips on the first Ctrl-C so phases can wind down at
/// their next check.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    cancel
}
