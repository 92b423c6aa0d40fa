use crate::config;
use crate::error::{FastBrewError, Result};
use colored::Colorize;

pub fn show() -> Result<()> {
    let cfg = config::load();
    println!("{}", "FastBrew configuration".bold());
    println!("  parallel_downloads = {}", cfg.parallel_downloads);
    println!("  show_progress      = {}", cfg.show_progress);
    println!("  auto_cleanup       = {}", cfg.auto_cleanup);
    println!("  verbose            = {}", cfg.verbose);
    println!("\nFile: {}", config::config_path().display().to_string().dimmed());
    Ok(())
}

pub fn set(key: &str, value: &str) -> Result<()> {
    // Start from the persisted state, not the process-cached one, so
    // repeated `config set` calls compose.
    let mut cfg = read_fresh();

    match key {
        "parallel_downloads" => {
            let parsed: u32 = value.parse().map_err(|_| {
                FastBrewError::Other(anyhow::anyhow!("parallel_downloads expects a number 1-20"))
            })?;
            cfg.parallel_downloads = parsed.clamp(1, 20);
        }
        "show_progress" => cfg.show_progress = parse_bool(value)?,
        "auto_cleanup" => cfg.auto_cleanup = parse_bool(value)?,
        "verbose" => cfg.verbose = parse_bool(value)?,
        other => {
            return Err(FastBrewError::Other(anyhow::anyhow!(
                "unknown config key: {other}"
            )));
        }
    }

    cfg.save()?;
    println!("{} Set {key} = {value}", "✓".green());
    Ok(())
}

fn read_fresh() -> config::Config {
    std::fs::read_to_string(config::config_path())
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or_default()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(FastBrewError::Other(anyhow::anyhow!(
            "expected true/false, got {other}"
        ))),
    }
}
