//! spotrace — race GPU offers until one instance comes up.
//!
//! # Usage
//!
//! ```text
//! spotrace race --config spotrace.toml --offers offers.json
//! spotrace race --config spotrace.toml --offers offers.json --dry-run
//! spotrace check --config spotrace.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod provider;

#[derive(Parser)]
#[command(
    name = "spotrace",
    about = "Speculative multi-candidate instance provisioning",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one race and print the winner's connection details.
    ///
    /// Ctrl-C cancels the race and destroys every instance it created.
    Race {
        /// Path to spotrace.toml
        #[arg(short, long, default_value = "spotrace.toml")]
        config: PathBuf,
        /// JSON array of offers, raced in file order
        #[arg(short, long)]
        offers: PathBuf,
        /// Race against the in-process mock provider instead of `[provider]`.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a config file and print the resolved race settings.
    Check {
        #[arg(short, long, default_value = "spotrace.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("info,spotrace=debug")?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Race {
            config,
            offers,
            dry_run,
        } => commands::race::run(&config, &offers, dry_run).await,
        Commands::Check { config } => commands::check::run(&config),
    }
}
