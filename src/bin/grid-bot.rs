// IFD Grid Bot - command line entry point
// One `tick` per invocation; schedule it with cron or a systemd timer.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use ifd_grid_bot::{Config, ConfigError};

// Load command modules from cli directory
#[path = "../cli/tick_commands.rs"]
mod tick_commands;
#[path = "../cli/status_commands.rs"]
mod status_commands;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version = "0.3.0")]
#[command(about = "IFD grid trading controller for bitFlyer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the data directory
    Init,

    /// Run one reconciliation pass
    Tick {
        /// Log decisions without placing or canceling anything
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show grid, ledger and recent tick history
    Status {
        /// Also query price, balance and open brackets from the exchange
        #[arg(short, long)]
        live: bool,
    },

    /// Inspect or correct the reserved-funds ledger
    #[command(subcommand)]
    Ledger(LedgerCommands),
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Print the reserved total and per-bracket reservations
    Show,

    /// Zero the total and forget every reservation
    Reset {
        /// Skip the confirmation warning
        #[arg(short, long)]
        yes: bool,
    },

    /// Overwrite the reserved total
    Set {
        /// Amount in quote currency
        amount: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging first (before config load so we can see config errors)
    let log_level = if cli.verbose { "debug" } else { "info" };
    std::env::set_var("RUST_LOG", log_level);
    tracing_subscriber::fmt::init();

    info!("🚀 IFD Grid Bot v0.3.0");
    info!("📁 Config: {}", cli.config);

    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => {
            init_workspace(&cli.config)?;
        }

        Commands::Tick { dry_run } => {
            let config = load_config_or_exit(&cli.config);
            let report = tick_commands::run_tick(config, dry_run).await?;
            if !report.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Status { live } => {
            let config = load_config_or_exit(&cli.config);
            status_commands::show_status(&config, live).await?;
        }

        Commands::Ledger(cmd) => {
            let config = load_config_or_exit(&cli.config);
            match cmd {
                LedgerCommands::Show => status_commands::show_ledger(&config)?,
                LedgerCommands::Reset { yes } => status_commands::reset_ledger(&config, yes)?,
                LedgerCommands::Set { amount } => status_commands::set_ledger(&config, amount)?,
            }
        }
    }

    Ok(())
}

/// Load config or exit with helpful error message
fn load_config_or_exit(path: &str) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration Error");
            error!("{}", e);

            if matches!(e, ConfigError::Validation(_) | ConfigError::Parse(_)) {
                error!("");
                error!("💡 Quick fix:");
                error!("   1. Run: grid-bot init");
                error!("   2. Edit {} (or set MIN_PRICE / MAX_PRICE / PRICE_INTERVAL)", path);
                error!("   3. Try again");
            }

            std::process::exit(1);
        }
    }
}

fn init_workspace(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    use std::fs;

    info!("🔧 Initializing workspace...");

    fs::create_dir_all("data")?;

    if !std::path::Path::new(config_path).exists() {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Edit {} with your grid bounds", config_path);
    info!("   2. Export API_KEY and API_SECRET");
    info!("   3. Run: grid-bot tick --dry-run");

    Ok(())
}
