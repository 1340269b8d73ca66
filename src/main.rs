//! CLI Entry Point for fieldfox
//!
//! Lists, reads and writes Keysight N9917A parameters by name.
//!
//! # Usage
//!
//! ```bash
//! fieldfox --address 192.168.1.120 list
//! fieldfox --address 192.168.1.120 --class SA --channel 3 get spec_rbw
//! fieldfox --config fieldfox.toml set averaging_mode sweep
//! fieldfox --mock idn
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldfox::logging::{self, OutputFormat, TracingConfig};
use fieldfox::{FieldFoxConfig, KeysightN9917a, MockScpiClient, ParamValue, ParameterSpec};
use figment::providers::Serialized;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fieldfox")]
#[command(about = "Read and write Keysight N9917A FieldFox parameters over SCPI", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Instrument hostname or IP address
    #[arg(long, global = true)]
    address: Option<String>,

    /// SCPI socket port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// FieldFox channel
    #[arg(long, global = true, allow_negative_numbers = true)]
    channel: Option<i64>,

    /// Measurement class (CAT, VNA, SA)
    #[arg(long = "class", global = true)]
    measurement_class: Option<String>,

    /// Run the reset hook before registering parameters
    #[arg(long, global = true)]
    reset: bool,

    /// Use the in-memory instrument
    #[arg(long, global = true)]
    mock: bool,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Compact)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered parameters (no instrument I/O)
    List {
        /// Print parameter specs as JSON
        #[arg(long)]
        json: bool,

        /// Only parameters in this group
        #[arg(long)]
        group: Option<String>,
    },

    /// Read a parameter
    Get {
        name: String,
    },

    /// Write a parameter
    Set {
        name: String,
        value: String,
    },

    /// Run the reset hook
    Reset,

    /// Query the instrument identification string
    Idn,
}

/// Command-line values layered over file and environment configuration.
#[derive(Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    measurement_class: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reset: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    mock: bool,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            address: cli.address.clone(),
            port: cli.port,
            channel: cli.channel,
            measurement_class: cli.measurement_class.clone(),
            reset: cli.reset,
            mock: cli.mock,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config: FieldFoxConfig = FieldFoxConfig::figment(cli.config.as_deref())
        .merge(Serialized::defaults(CliOverrides::from(&cli)))
        .extract()
        .context("Failed to load configuration")?;

    let tracing_config = TracingConfig::from_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_format(cli.log_format);
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::List { json, group } => list(&config, json, group.as_deref()),
        Commands::Get { name } => {
            let driver = KeysightN9917a::connect(&config).await?;
            let value = driver.get(&name).await?;
            let spec = driver.parameter(&name)?;
            println!("{} = {}", name, with_unit(&value, spec));
            Ok(())
        }
        Commands::Set { name, value } => {
            let driver = KeysightN9917a::connect(&config).await?;
            driver.set(&name, value.as_str()).await?;
            println!("{} <- {}", name, value);
            Ok(())
        }
        Commands::Reset => {
            let driver = KeysightN9917a::connect(&config).await?;
            driver.reset_to_defaults();
            println!("{}: reset hook ran (no reset sequence defined)", driver.name());
            Ok(())
        }
        Commands::Idn => {
            let driver = KeysightN9917a::connect(&config).await?;
            println!("{}", driver.identify().await?);
            Ok(())
        }
    }
}

/// Print the registry. Registration is metadata only, so no connection is made.
fn list(config: &FieldFoxConfig, json: bool, group: Option<&str>) -> Result<()> {
    let driver = KeysightN9917a::new(config.identity(), Arc::new(MockScpiClient::new()))?;
    let specs: Vec<&ParameterSpec> = match group {
        Some(group) => driver.registry().group(group).collect(),
        None => driver.registry().iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!(
        "{:<20} {:<32} {:<6} {:<5} {:<6} {}",
        "NAME", "COMMAND", "TYPE", "UNIT", "ACCESS", "GROUP"
    );
    for spec in specs {
        println!(
            "{:<20} {:<32} {:<6} {:<5} {:<6} {}",
            spec.name(),
            spec.command().unwrap_or("-"),
            spec.value_type(),
            spec.unit().map(|u| u.symbol()).unwrap_or(""),
            format!("{:?}", spec.access()).to_lowercase(),
            spec.group().unwrap_or(""),
        );
    }
    Ok(())
}

fn with_unit(value: &ParamValue, spec: &ParameterSpec) -> String {
    match spec.unit() {
        Some(unit) => format!("{} {}", value, unit),
        None => value.to_string(),
    }
}
