use clap::{Parser, Subcommand};
use colored::Colorize;
use fastbrew::client::Client;
use fastbrew::commands;
use fastbrew::error::Result;

#[derive(Parser)]
#[command(name = "fastbrew")]
#[command(version, about = "An accelerated client for Homebrew bottles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install formulae (casks are delegated to brew)
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Show download progress bars
        #[arg(long)]
        progress: bool,
    },

    /// Upgrade outdated packages, honoring pins
    Upgrade {
        packages: Vec<String>,
        #[arg(long)]
        progress: bool,
    },

    /// Uninstall packages
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Uninstall then install packages
    Reinstall {
        #[arg(required = true)]
        packages: Vec<String>,
        #[arg(long)]
        progress: bool,
    },

    /// List installed packages
    List,

    /// Fuzzy-search formulae and casks
    Search {
        /// Query string
        query: String,
    },

    /// List outdated packages (exit 1 when any)
    Outdated {
        /// Only print names
        #[arg(short, long)]
        quiet: bool,
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Show package metadata
    Info {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Print the resolved dependency closure
    Deps {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Installed formulae no other formula depends on
    Leaves,

    /// Remove orphaned dependencies
    Autoremove {
        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Remove old versions, stale cache files and broken symlinks
    Cleanup,

    /// Run system health checks (exit 1 on any warning/error)
    Doctor,

    /// Create prefix symlinks for installed packages
    Link {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Enumerate without creating anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Remove a package's prefix symlinks
    Unlink {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Pin a package to prevent upgrades
    Pin { package: String },

    /// Unpin a package
    Unpin { package: String },

    /// List pinned packages
    Pinned,

    /// Force-refresh the catalog and search indices
    Update,

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Control background services
    Services {
        /// list, status, start, stop or restart
        action: Option<String>,
        /// Service name
        name: Option<String>,
    },

    /// Print shell environment configuration
    Sh {
        /// Detect the shell from $SHELL
        #[arg(long)]
        auto: bool,
    },

    /// Print the build version
    Version,

    /// Anything else is passed through to brew
    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Set a configuration key
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Install { packages, progress } => {
            let client = Client::new()?;
            let progress = progress || commands::show_progress(&client.config);
            commands::install::install(&client, &packages, progress).await?;
        }
        Commands::Upgrade { packages, progress } => {
            let client = Client::new()?;
            let progress = progress || commands::show_progress(&client.config);
            commands::upgrade::upgrade(&client, &packages, progress).await?;
        }
        Commands::Uninstall { packages } => {
            let client = Client::new()?;
            commands::install::uninstall(&client, &packages)?;
        }
        Commands::Reinstall { packages, progress } => {
            let client = Client::new()?;
            let progress = progress || commands::show_progress(&client.config);
            commands::install::reinstall(&client, &packages, progress).await?;
        }
        Commands::List => {
            let client = Client::new()?;
            commands::list::list(&client)?;
        }
        Commands::Search { query } => {
            let client = Client::new()?;
            commands::search::search(&client, &query).await?;
        }
        Commands::Outdated { quiet, json } => {
            let client = Client::new()?;
            return commands::maintenance::outdated(&client, quiet, json).await;
        }
        Commands::Info { packages } => {
            let client = Client::new()?;
            commands::info::info(&client, &packages).await?;
        }
        Commands::Deps { packages } => {
            let client = Client::new()?;
            commands::deps::deps(&client, &packages).await?;
        }
        Commands::Leaves => {
            let client = Client::new()?;
            commands::deps::leaves(&client).await?;
        }
        Commands::Autoremove { dry_run, yes } => {
            let client = Client::new()?;
            commands::deps::autoremove(&client, dry_run, yes).await?;
        }
        Commands::Cleanup => {
            let client = Client::new()?;
            commands::maintenance::cleanup(&client)?;
        }
        Commands::Doctor => {
            let client = Client::new()?;
            return Ok(commands::maintenance::doctor(&client, cli.verbose));
        }
        Commands::Link { packages, dry_run } => {
            let client = Client::new()?;
            commands::linking::link(&client, &packages, dry_run)?;
        }
        Commands::Unlink { packages } => {
            let client = Client::new()?;
            commands::linking::unlink(&client, &packages)?;
        }
        Commands::Pin { package } => commands::pin::pin(&package)?,
        Commands::Unpin { package } => commands::pin::unpin(&package)?,
        Commands::Pinned => commands::pin::pinned()?,
        Commands::Update => {
            let client = Client::new()?;
            commands::maintenance::update(&client).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show()?,
            ConfigAction::Set { key, value } => commands::config::set(&key, &value)?,
        },
        Commands::Services { action, name } => {
            return services(action.as_deref(), name.as_deref());
        }
        Commands::Sh { auto } => commands::shellenv::sh(auto),
        Commands::Version => println!("fastbrew {}", env!("CARGO_PKG_VERSION")),
        Commands::External(args) => {
            return Ok(commands::fallback_to_brew(&args));
        }
    }
    Ok(0)
}

fn services(action: Option<&str>, name: Option<&str>) -> Result<i32> {
    use fastbrew::services::{self, ServiceStatus};

    let manager = services::manager();
    match (action, name) {
        (None, _) | (Some("list"), _) => {
            let list = manager.list()?;
            if list.is_empty() {
                println!("No services found.");
                return Ok(0);
            }
            println!("{:<24} {}", "Name".bold(), "Status".bold());
            for service in list {
                let status = match service.status {
                    ServiceStatus::Started => "started".green().to_string(),
                    ServiceStatus::Stopped => "stopped".dimmed().to_string(),
                    ServiceStatus::Error(code) => format!("error {code}").red().to_string(),
                };
                println!("{:<24} {status}", service.name.cyan());
            }
        }
        (Some("status"), Some(name)) => {
            let status = manager.status(name)?;
            println!("{name}: {status:?}");
        }
        (Some("start"), Some(name)) => {
            manager.start(name)?;
            println!("{} Started {name}", "✓".green());
        }
        (Some("stop"), Some(name)) => {
            manager.stop(name)?;
            println!("{} Stopped {name}", "✓".green());
        }
        (Some("restart"), Some(name)) => {
            manager.restart(name)?;
            println!("{} Restarted {name}", "✓".green());
        }
        (Some(other), _) => {
            eprintln!("Unknown services action: {other}");
            return Ok(1);
        }
    }
    Ok(0)
}
