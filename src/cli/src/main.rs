//! toolhub operator CLI.
//!
//! Manages API keys and inspects the project catalog and configuration of a
//! ToolHub deployment without starting the hub.

mod commands;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolhub_core::telemetry::init_telemetry;

use commands::{config::ConfigCommands, keys::KeyCommands, projects::ProjectCommands, Context};
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "toolhub",
    about = "Operate a ToolHub deployment: API keys, projects and configuration",
    version,
    propagate_version = true
)]
struct Cli {
    /// Hub configuration file (TOML)
    #[arg(long, global = true, env = "TOOLHUB_CONFIG")]
    config: Option<PathBuf>,

    /// API key store file; overrides `keys.store_path` from the configuration
    #[arg(long, global = true, env = "TOOLHUB_KEYS_FILE")]
    keys_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log at the configured `[logging]` level instead of warnings only
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list, revoke and rotate API keys
    #[command(subcommand)]
    Keys(KeyCommands),

    /// Inspect configured and discovered projects
    #[command(subcommand)]
    Projects(ProjectCommands),

    /// Inspect the hub configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(cli.config, cli.keys_file, cli.format);
    let _telemetry = init_telemetry(&ctx.telemetry_config(cli.verbose)).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Keys(cmd) => commands::keys::execute(cmd, &ctx),
        Commands::Projects(cmd) => commands::projects::execute(cmd, &ctx),
        Commands::Config(cmd) => commands::config::execute(cmd, &ctx),
    }
}
