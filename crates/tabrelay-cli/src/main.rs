//! tabrelay CLI - table extraction and typed replication tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabrelay_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Source fetch error (network, HTTP status, retries exhausted)
    FetchError = 2,
    /// Document or table parsing error
    ParseError = 3,
    /// Broker channel error (producer, consumer, offset commit)
    DeliveryError = 4,
    /// Storage error (connection, DDL, batch write)
    StorageError = 5,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Map an error to an exit code by inspecting the underlying domain error.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(domain) = error.downcast_ref::<tabrelay_core::Error>() {
            return match domain {
                tabrelay_core::Error::Config(_) => ExitCode::ConfigError,
                tabrelay_core::Error::Fetch(_) => ExitCode::FetchError,
                tabrelay_core::Error::Parse(_) => ExitCode::ParseError,
                tabrelay_core::Error::Delivery(_) => ExitCode::DeliveryError,
                tabrelay_core::Error::Storage(_) => ExitCode::StorageError,
                _ => ExitCode::RuntimeError,
            };
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Table extraction and typed replication CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the source document and publish its tables to the broker
    Publish {
        /// Override the source document URL
        #[arg(long)]
        url: Option<String>,

        /// Override Kafka bootstrap servers
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override Kafka topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// Consume transport units and replicate them into storage
    Relay {
        /// Override Kafka bootstrap servers
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override Kafka topic
        #[arg(long)]
        topic: Option<String>,

        /// Override consumer group
        #[arg(long)]
        consumer_group: Option<String>,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Publish {
            url,
            bootstrap_servers,
            topic,
        } => {
            let config = load_config(&cli.config)?;
            commands::publish::run(config, url, bootstrap_servers, topic).await?;
        }

        Commands::Relay {
            bootstrap_servers,
            topic,
            consumer_group,
        } => {
            let config = load_config(&cli.config)?;
            commands::relay::run(config, bootstrap_servers, topic, consumer_group).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::from_file(&path)?;
    Ok(config)
}
