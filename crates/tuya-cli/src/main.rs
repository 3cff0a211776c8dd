//! Tuya CLI - Command-line tool for the Tuya IoT cloud
//!
//! Lists devices, looks them up by name, reads status and sends commands
//! through the signed OpenAPI.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tuya_client::{ClientConfig, TuyaClient};

use crate::config::{ArgOverrides, Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "tuya-cli")]
#[command(author, version, about = "Tuya IoT Cloud CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Cloud project access id
    #[arg(long, env = "TUYA_CLIENT_ID")]
    client_id: Option<String>,

    /// Cloud project access secret
    #[arg(long, env = "TUYA_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Data center: eu, us, cn, in
    #[arg(short, long, env = "TUYA_REGION")]
    region: Option<String>,

    /// Override the API host (e.g. a proxy)
    #[arg(long, env = "TUYA_BASE_URL")]
    base_url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "TUYA_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices
    List {
        /// Devices per page (1-200)
        #[arg(long, default_value = "20")]
        page_size: u32,

        /// Only fetch the first page
        #[arg(long)]
        first_page: bool,
    },

    /// Find a device id by name
    Find {
        /// Name to look for
        name: String,

        /// Match the product name instead of the custom name
        #[arg(long)]
        by_name: bool,
    },

    /// Show device details
    Info {
        /// Device ID
        device: String,
    },

    /// Read device status data points
    Status {
        /// Device ID
        device: String,
    },

    /// Check whether a device is online
    Online {
        /// Device ID, name or custom name
        device: String,
    },

    /// Send commands to a device
    Send {
        /// Device ID
        device: String,

        /// Data point code, e.g. switch_1
        #[arg(requires = "value", conflicts_with = "commands")]
        code: Option<String>,

        /// Value (string, number, or JSON)
        value: Option<String>,

        /// Command batch as JSON: [{"code": ..., "value": ...}]
        #[arg(long)]
        commands: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&ArgOverrides {
        client_id: cli.client_id.as_deref(),
        client_secret: cli.client_secret.as_deref(),
        region: cli.region.as_deref(),
        base_url: cli.base_url.as_deref(),
        output: cli.output.map(Into::into),
        no_color: cli.no_color,
    })?;

    let format = cli.output.unwrap_or_else(|| {
        OutputFormat::from_str(&merged.output, true).unwrap_or_default()
    });
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);
    let client = create_client(&merged)?;

    match &cli.command {
        Commands::List {
            page_size,
            first_page,
        } => {
            commands::list(&client, *page_size, *first_page, &ctx).await?;
        }

        Commands::Find { name, by_name } => {
            commands::find(&client, name, *by_name, &ctx).await?;
        }

        Commands::Info { device } => {
            commands::info(&client, device, &ctx).await?;
        }

        Commands::Status { device } => {
            commands::status(&client, device, &ctx).await?;
        }

        Commands::Online { device } => {
            commands::online(&client, device, &ctx).await?;
        }

        Commands::Send {
            device,
            code,
            value,
            commands: batch,
        } => {
            commands::send(
                &client,
                device,
                code.as_deref(),
                value.as_deref(),
                batch.as_deref(),
                &ctx,
            )
            .await?;
        }
    }

    Ok(())
}

/// Create a Tuya client from the resolved configuration
fn create_client(merged: &MergedConfig) -> Result<TuyaClient> {
    let config = ClientConfig {
        base_url: merged.base_url.clone(),
        ..Default::default()
    };
    TuyaClient::with_config(merged.credentials.clone(), config)
        .context("Failed to create Tuya client")
}

// Implement conversion for OutputFormat to string (for config merge)
impl From<OutputFormat> for &str {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}
