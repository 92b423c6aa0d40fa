use crate::cellar;
use crate::client::Client;
use crate::error::Result;
use crate::resolver;
use crate::symlink;
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;

pub async fn deps(client: &Client, names: &[String]) -> Result<()> {
    let index = client.catalog().load_index().await?;
    let deps = resolver::resolve_deps(&index, names);

    for dep in deps {
        println!("{dep}");
    }
    Ok(())
}

/// Installed formulae that no other installed formula depends on.
pub async fn leaves(client: &Client) -> Result<()> {
    for name in compute_leaves(client).await? {
        println!("{name}");
    }
    Ok(())
}

async fn compute_leaves(client: &Client) -> Result<Vec<String>> {
    let installed = cellar::list_installed(&client.cellar)?;
    if installed.is_empty() {
        return Ok(Vec::new());
    }

    let index = client.catalog().load_index().await?;
    let formula_map = index.formula_map();

    let mut is_dep: HashSet<&str> = HashSet::new();
    for pkg in &installed {
        if let Some(formula) = formula_map.get(pkg.name.as_str()) {
            for dep in &formula.dependencies {
                is_dep.insert(dep.as_str());
            }
        }
    }

    Ok(installed
        .iter()
        .filter(|pkg| !is_dep.contains(pkg.name.as_str()))
        .map(|pkg| pkg.name.clone())
        .collect())
}

/// Remove installed formulae that no leaf needs, directly or
/// transitively. Casks never participate.
pub async fn autoremove(client: &Client, dry_run: bool, assume_yes: bool) -> Result<()> {
    let orphans = find_orphans(client).await?;

    if orphans.is_empty() {
        println!("{} No orphaned packages to remove.", "✓".green());
        return Ok(());
    }

    println!(
        "{} Found {} orphaned package(s):",
        "🔍".normal(),
        orphans.len().to_string().bold()
    );
    for name in &orphans {
        println!("  • {name}");
    }

    if dry_run {
        println!("\nDry run - no packages were removed.");
        return Ok(());
    }

    if !assume_yes && !confirm(&format!("Remove {} orphaned package(s)?", orphans.len()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let mut removed = 0;
    for name in &orphans {
        symlink::unlink_keg(&client.prefix, &client.cellar, name)?;
        match fs::remove_dir_all(client.cellar.join(name)) {
            Ok(()) => {
                println!("{} Removed {name}", "✓".green());
                removed += 1;
            }
            Err(e) => println!("{} Error removing {name}: {e}", "✗".red()),
        }
    }
    println!("\n{} Removed {removed} orphaned package(s).", "🧹".normal());

    Ok(())
}

async fn find_orphans(client: &Client) -> Result<Vec<String>> {
    let installed = cellar::list_installed(&client.cellar)?;
    if installed.is_empty() {
        return Ok(Vec::new());
    }

    let index = client.catalog().load_index().await?;
    let formula_map = index.formula_map();
    let installed_set: HashSet<&str> = installed.iter().map(|pkg| pkg.name.as_str()).collect();

    // Leaves: packages no other installed package depends on.
    let mut dependents: HashMap<&str, usize> = HashMap::new();
    for pkg in &installed {
        if let Some(formula) = formula_map.get(pkg.name.as_str()) {
            for dep in &formula.dependencies {
                if installed_set.contains(dep.as_str()) {
                    *dependents.entry(dep.as_str()).or_default() += 1;
                }
            }
        }
    }

    // Needed: the transitive closure of the leaves over installed deps.
    let mut needed: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = installed
        .iter()
        .map(|pkg| pkg.name.as_str())
        .filter(|name| !dependents.contains_key(name))
        .collect();

    while let Some(name) = stack.pop() {
        if !needed.insert(name) {
            continue;
        }
        if let Some(formula) = formula_map.get(name) {
            for dep in &formula.dependencies {
                if installed_set.contains(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
    }

    Ok(installed
        .iter()
        .map(|pkg| pkg.name.as_str())
        .filter(|name| !needed.contains(name))
        .map(str::to_string)
        .collect())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N]: ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
