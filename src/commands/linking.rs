use crate::cellar;
use crate::client::Client;
use crate::error::{FastBrewError, Result};
use crate::symlink;
use colored::Colorize;

pub fn link(client: &Client, names: &[String], dry_run: bool) -> Result<()> {
    for name in names {
        let versions = cellar::installed_versions(&client.cellar, name)?;
        let Some(version) = versions.first() else {
            return Err(FastBrewError::UnknownPackage(format!(
                "{name} is not installed"
            )));
        };

        if dry_run {
            let result = symlink::link_keg_dry_run(&client.prefix, &client.cellar, name, version)?;
            println!(
                "Would link {} file(s) for {}:",
                result.links.len().to_string().bold(),
                name.cyan()
            );
            for path in &result.links {
                println!("  {}", path.display());
            }
            continue;
        }

        let result = symlink::link_keg(&client.prefix, &client.cellar, name, version)?;
        for error in &result.errors {
            println!("  {} {error}", "✗".red());
        }
        println!(
            "{} Linked {} file(s) for {}",
            "✓".green(),
            result.links.len().to_string().bold(),
            name.cyan()
        );
    }
    Ok(())
}

pub fn unlink(client: &Client, names: &[String]) -> Result<()> {
    for name in names {
        if !client.is_installed(name) {
            println!("  {} {name} is not installed", "⚠".yellow());
            continue;
        }
        let removed = symlink::unlink_keg(&client.prefix, &client.cellar, name)?;
        println!(
            "{} Unlinked {} symlink(s) for {}",
            "✓".green(),
            removed.len().to_string().bold(),
            name.cyan()
        );
    }
    Ok(())
}
