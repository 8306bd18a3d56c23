//! # Admiral Configuration Validator
//!
//! Command-line tool for validating Admiral configuration across environments.
//! Catches invalid intervals and budgets before the orchestration system starts.

use admiral_core::config::{AdmiralConfig, ConfigManager};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Admiral configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format of the effective configuration
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the whole configuration
    All,

    /// Validate and print one configuration section
    Component {
        /// Section name (task, retry, session_cache, seeding, pks, maintenance, composite)
        name: String,
    },

    /// List environments with an override file in the configuration directory
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<AdmiralConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("failed to load configuration for environment '{}'", cli.environment))?;
    Ok(manager.config().clone())
}

fn validate_all_config(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Admiral Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let config = load(cli)?;
    println!("✅ Configuration loaded and validated");
    print_value(cli.format, "effective configuration", &serde_json::to_value(&config)?)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, name: &str) -> Result<()> {
    println!("🔧 Validating Component: {name}");

    let config = load(cli)?;
    let section = match name.to_lowercase().replace('-', "_").as_str() {
        "task" => serde_json::to_value(&config.task)?,
        "retry" => serde_json::to_value(&config.retry)?,
        "session_cache" => serde_json::to_value(&config.session_cache)?,
        "seeding" => serde_json::to_value(&config.seeding)?,
        "pks" => serde_json::to_value(&config.pks)?,
        "maintenance" => serde_json::to_value(&config.maintenance)?,
        "composite" => serde_json::to_value(&config.composite)?,
        _ => bail!("Unknown component: {name}"),
    };
    print_value(cli.format, name, &section)?;

    println!("✅ Component '{name}' validation passed!");
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<()> {
    println!("📋 Available Environments:");

    let config_dir = cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"));
    if !config_dir.exists() {
        println!("❌ Configuration directory not found: {}", config_dir.display());
        return Ok(());
    }

    for environment in environments_in(&config_dir)? {
        println!("  • {environment}");
    }
    Ok(())
}

/// Environments with an `admiral.<env>.toml` override file
fn environments_in(dir: &Path) -> Result<Vec<String>> {
    let mut environments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(environment) = name
            .strip_prefix("admiral.")
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(environment.to_string());
        }
    }
    environments.sort();
    Ok(environments)
}

fn print_value(format: OutputFormat, title: &str, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => {
            println!("\n{title}:");
            let mut rows = Vec::new();
            flatten("", value, &mut rows);
            let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in rows {
                println!("   {key:<width$}  {value}");
            }
        }
    }
    Ok(())
}

fn flatten(prefix: &str, value: &serde_json::Value, rows: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, rows);
            }
        }
        other => rows.push((prefix.to_string(), other.to_string())),
    }
}
