use crate::cellar;
use crate::client::Client;
use crate::error::Result;
use colored::Colorize;
use std::io::IsTerminal;

pub fn list(client: &Client) -> Result<()> {
    let formulae = cellar::list_installed(&client.cellar)?;
    let casks = cellar::list_installed_casks();
    let is_tty = std::io::stdout().is_terminal();

    if formulae.is_empty() && casks.is_empty() {
        if is_tty {
            println!("No packages installed.");
        }
        return Ok(());
    }

    if !formulae.is_empty() {
        if is_tty {
            println!("{}", "==> Formulae".bold().green());
        }
        for pkg in &formulae {
            if is_tty {
                println!("{} {}", pkg.name, pkg.version.dimmed());
            } else {
                println!("{}", pkg.name);
            }
        }
    }

    if !casks.is_empty() {
        if is_tty {
            println!("\n{}", "==> Casks".bold().cyan());
        }
        for pkg in &casks {
            println!("{}", pkg.name);
        }
    }

    if is_tty {
        let taps = crate::tap::list_taps()?;
        if !taps.is_empty() {
            println!("\n{}", "==> Taps".bold());
            for tap in &taps {
                println!("{}", tap.name);
            }
        }
    }

    Ok(())
}
