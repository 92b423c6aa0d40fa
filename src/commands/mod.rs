//! Thin CLI shells over the library core.

pub mod config;
pub mod deps;
pub mod info;
pub mod install;
pub mod linking;
pub mod list;
pub mod maintenance;
pub mod pin;
pub mod search;
pub mod shellenv;
pub mod upgrade;

use crate::progress::{EventKind, ProgressManager};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

/// Whether progress bars should render at all.
pub fn show_progress(config: &crate::config::Config) -> bool {
    config.show_progress && std::io::stdout().is_terminal()
}

/// Bridge the progress bus onto indicatif bars. Returns the manager to
/// hand to the pipeline and a join handle for the renderer thread; drop
/// the manager (unsubscribe) to stop rendering.
pub fn spawn_renderer(enabled: bool) -> (Option<Arc<ProgressManager>>, Option<std::thread::JoinHandle<()>>) {
    if !enabled {
        return (None, None);
    }

    let manager = Arc::new(ProgressManager::new());
    let rx = manager.subscribe("cli-renderer");

    let handle = std::thread::spawn(move || {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━╸");
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        while let Ok(event) = rx.recv() {
            match event.kind {
                EventKind::Start => {
                    let bar = multi.add(ProgressBar::new(event.total));
                    bar.set_style(style.clone());
                    bar.set_message(format!("Downloading {}", event.id));
                    bars.insert(event.id, bar);
                }
                EventKind::Progress => {
                    if let Some(bar) = bars.get(&event.id) {
                        if event.total > 0 && bar.length() != Some(event.total) {
                            bar.set_length(event.total);
                        }
                        bar.set_position(event.current);
                    }
                }
                EventKind::Complete => {
                    if let Some(bar) = bars.remove(&event.id) {
                        bar.finish_with_message(format!("✓ {}", event.id));
                    }
                }
                EventKind::Error => {
                    if let Some(bar) = bars.remove(&event.id) {
                        bar.abandon_with_message(format!("✗ {}: {}", event.id, event.message));
                    }
                }
            }
        }
    });

    (Some(manager), Some(handle))
}

pub fn stop_renderer(
    manager: Option<Arc<ProgressManager>>,
    handle: Option<std::thread::JoinHandle<()>>,
) {
    if let Some(manager) = manager {
        manager.unsubscribe("cli-renderer");
    }
    if let Some(handle) = handle {
        let _ = handle.join();
    }
}

/// Pass a whole invocation through to the host package manager,
/// preserving its exit code.
pub fn fallback_to_brew(args: &[String]) -> i32 {
    println!("⏩ Passing to brew: brew {}", args.join(" "));
    match std::process::Command::new("brew").args(args).status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            eprintln!("Error: failed to run brew: {e}");
            1
        }
    }
}
