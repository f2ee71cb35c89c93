use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scrapeflow::config::Config;
use scrapeflow::scheduler::DaemonConfig;

#[derive(Parser)]
#[command(
    name = "scrapeflow",
    version,
    about = "Concurrent scrape execution engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print upcoming daemon cycle times
    Schedule {
        /// Path to the TOML configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Number of cycles to show
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Validate { config } | Commands::Schedule { config, .. } => config.clone(),
    };
    let config = Config::from_file(&config_path)?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Validate { config: path } => {
            tracing::info!(path = %path.display(), "Validating configuration");
            validate(&config)?;
            println!("Configuration OK: {}", path.display());
            println!("  Workers: {}", config.engine.workers);
            println!(
                "  Throttle: {}",
                match config.engine.throttle_bytes_per_sec {
                    0 => "unlimited".to_string(),
                    rate => format!("{rate} bytes/sec"),
                }
            );
            println!(
                "  Retry: {} attempts, {}ms initial, {}ms max",
                config.retry.max_attempts, config.retry.initial_wait_ms, config.retry.max_wait_ms
            );
            println!("  Daemon interval: {} minutes", config.daemon.interval_minutes);
        }

        Commands::Schedule { count, .. } => {
            tracing::info!(count, "Computing upcoming daemon cycles");
            let daemon = validate(&config)?;
            let runs = daemon
                .upcoming_runs(&Local::now(), count)
                .context("Failed to compute schedule")?;

            println!("Upcoming cycles:");
            for (i, run) in runs.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, run.format("%Y-%m-%d %H:%M %Z"));
            }
            if let Some(max) = daemon.max_runs {
                println!("Daemon stops after {max} cycles");
            }
        }
    }

    Ok(())
}

fn validate(config: &Config) -> Result<DaemonConfig> {
    config.validate()?;
    let daemon = DaemonConfig::from_settings(&config.daemon).context("Invalid daemon settings")?;
    Ok(daemon)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("scrapeflow=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scrapeflow={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
