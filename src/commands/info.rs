use crate::client::Client;
use crate::error::{FastBrewError, Result};
use colored::Colorize;

pub async fn info(client: &Client, names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            println!();
        }
        match client.api.fetch_formula(name).await {
            Ok(formula) => {
                let version = formula.versions.stable.as_deref().unwrap_or("unknown");
                println!("{} {}", formula.name.bold().green(), version.bold());
                if let Some(desc) = &formula.desc {
                    println!("{desc}");
                }
                if let Some(homepage) = &formula.homepage {
                    println!("{}", homepage.cyan().underline());
                }
                if formula.keg_only {
                    println!("{}", "keg-only: not linked into the prefix".yellow());
                }
                if !formula.dependencies.is_empty() {
                    println!("{} {}", "Dependencies:".bold(), formula.dependencies.join(", "));
                }
                if client.is_installed(&formula.name) {
                    let versions =
                        crate::cellar::installed_versions(&client.cellar, &formula.name)?;
                    println!("{} {}", "Installed:".bold(), versions.join(", ").green());
                } else {
                    println!("{} {}", "Installed:".bold(), "no".dimmed());
                }
            }
            Err(FastBrewError::UnknownPackage(_)) => {
                // Not a formula; maybe a cask.
                let cask = client.api.fetch_cask(name).await?;
                let version = cask.version.as_deref().unwrap_or("unknown");
                println!("{} {} {}", cask.token.bold().cyan(), version.bold(), "(cask)".dimmed());
                if let Some(desc) = &cask.desc {
                    println!("{desc}");
                }
                if let Some(homepage) = &cask.homepage {
                    println!("{}", homepage.cyan().underline());
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
