use crate::config;
use crate::error::Result;
use colored::Colorize;

pub fn pin(name: &str) -> Result<()> {
    let mut pinned = config::load_pinned()?;
    if !pinned.insert(name.to_string()) {
        println!("{} {name} is already pinned", "📌".normal());
        return Ok(());
    }
    config::save_pinned(&pinned)?;
    println!("{} Pinned {}", "📌".normal(), name.bold());
    Ok(())
}

pub fn unpin(name: &str) -> Result<()> {
    let mut pinned = config::load_pinned()?;
    if !pinned.remove(name) {
        println!("{name} is not pinned");
        return Ok(());
    }
    config::save_pinned(&pinned)?;
    println!("{} Unpinned {}", "📍".normal(), name.bold());
    Ok(())
}

pub fn pinned() -> Result<()> {
    let pinned = config::load_pinned()?;
    if pinned.is_empty() {
        println!("No pinned packages.");
        return Ok(());
    }
    println!("{} Pinned packages:", "📌".normal());
    for name in &pinned {
        println!("  • {name}");
    }
    Ok(())
}
