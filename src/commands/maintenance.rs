use crate::cleanup;
use crate::client::Client;
use crate::doctor::{self, CheckStatus};
use crate::error::Result;
use crate::outdated;
use colored::Colorize;

pub fn cleanup(client: &Client) -> Result<()> {
    println!("{} Cleaning up...", "🧹".normal());
    let report = cleanup::run(client)?;

    for (name, version) in &report.removed_versions {
        println!("  {} Removed {name} {version}", "🗑".normal());
    }
    for path in &report.removed_cache_files {
        println!("  {} Removed cached {}", "🗑".normal(), path.display().to_string().dimmed());
    }
    for path in &report.removed_symlinks {
        println!("  {} Removed broken symlink {}", "🗑".normal(), path.display().to_string().dimmed());
    }

    let total = report.removed_versions.len()
        + report.removed_cache_files.len()
        + report.removed_symlinks.len();
    if total == 0 {
        println!("{} Nothing to clean.", "✓".green());
    } else {
        println!("{} Cleanup complete ({total} item(s)).", "✓".green());
    }
    Ok(())
}

/// Run all checks; process exit code 1 on any warning or error.
pub fn doctor(client: &Client, verbose: bool) -> i32 {
    println!("{}", "🩺 FastBrew Doctor".bold());
    println!("================\n");

    let results = doctor::run_diagnostics(client);
    let mut warnings = 0;
    let mut errors = 0;

    for result in &results {
        match result.status {
            CheckStatus::Ok => {
                println!("{} {}: {}", "✓".green(), result.name, result.message);
            }
            CheckStatus::Info => {
                println!("{} {}: {}", "ℹ".cyan(), result.name, result.message);
            }
            CheckStatus::Warning => {
                warnings += 1;
                println!("{} {}: {}", "⚠".yellow(), result.name, result.message.yellow());
                if let Some(suggestion) = &result.suggestion {
                    println!("   {suggestion}");
                }
            }
            CheckStatus::Error => {
                errors += 1;
                println!("{} {}: {}", "✗".red(), result.name, result.message.red());
                if let Some(suggestion) = &result.suggestion {
                    println!("   {suggestion}");
                }
            }
        }

        if verbose {
            for detail in &result.details {
                println!("   - {detail}");
            }
        }
    }

    println!(
        "\nDiagnostic count: {} checks, {warnings} warning(s), {errors} error(s)",
        results.len()
    );
    doctor::exit_code(&results)
}

/// Force-refresh the catalogs and derived indices.
pub async fn update(client: &Client) -> Result<()> {
    // Drop anything that no longer decodes before fetching fresh copies.
    let repair = crate::cache::CorruptionChecker::new(&client.cache_dir).check_and_repair();
    for path in &repair.removed {
        println!(
            "  {} Removed corrupt cache file {}",
            "🗑".normal(),
            path.display().to_string().dimmed()
        );
    }

    println!("{} Refreshing package index...", "🔄".normal());
    client.catalog().force_refresh().await?;
    client.invalidate_index();

    let (buckets, items, avg) = client.catalog().prefix_index()?.stats();
    println!(
        "{} Index refreshed: {} packages, {} buckets (avg {:.1} entries)",
        "✓".green(),
        items.to_string().bold(),
        buckets,
        avg
    );
    Ok(())
}

/// Print outdated packages. Exit code 1 iff any are outdated.
pub async fn outdated(client: &Client, quiet: bool, json: bool) -> Result<i32> {
    let outdated = outdated::get_outdated(client).await?;

    if outdated.is_empty() {
        return Ok(0);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outdated)?);
    } else if quiet {
        for pkg in &outdated {
            println!("{}", pkg.name);
        }
    } else {
        for pkg in &outdated {
            println!(
                "{} ({}) < {}",
                pkg.name.bold(),
                pkg.current_version.dimmed(),
                pkg.new_version.green()
            );
        }
    }

    Ok(1)
}
