use crate::client::Client;
use crate::error::Result;
use colored::Colorize;
use std::io::IsTerminal;

pub async fn search(client: &Client, query: &str) -> Result<()> {
    // Make sure the catalog (and therefore the index) exists before the
    // first search on a fresh machine.
    client.catalog().ensure_fresh().await?;

    let results = client.search_fuzzy(query)?;
    let is_tty = std::io::stdout().is_terminal();

    if results.is_empty() {
        if is_tty {
            println!("{} No formulae or casks found matching '{query}'", "✗".red());
        }
        return Ok(());
    }

    let (formulae, casks): (Vec<_>, Vec<_>) =
        results.into_iter().partition(|(item, _)| !item.is_cask);

    if !formulae.is_empty() {
        if is_tty {
            println!("{}", "==> Formulae".bold().green());
        }
        for (item, _) in &formulae {
            if is_tty && !item.desc.is_empty() {
                println!("{}: {}", item.name.bold(), item.desc.dimmed());
            } else {
                println!("{}", item.name);
            }
        }
    }

    if !casks.is_empty() {
        if is_tty {
            if !formulae.is_empty() {
                println!();
            }
            println!("{}", "==> Casks".bold().cyan());
        }
        for (item, _) in &casks {
            if is_tty && !item.desc.is_empty() {
                println!("{}: {}", item.name.bold(), item.desc.dimmed());
            } else {
                println!("{}", item.name);
            }
        }
    }

    Ok(())
}
