// Copyright (c) 2024 The Drisschain Developers

use anyhow::Result;
use clap::{Parser, Subcommand};

use drisschain::{commands, config, telemetry};

#[derive(Parser)]
#[command(name = "drisschain")]
#[command(about = "A minimal proof-of-work chain with drisscript contracts", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.drisschain/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a node key and write a default config
    Init,

    /// Run the node
    Run {
        /// Mine blocks on top of the current tip
        #[arg(long)]
        mine: bool,

        /// Request the chain from peers before doing anything else
        #[arg(long)]
        sync: bool,
    },

    /// Show node and chain status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(cli.verbose)?;

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init => commands::init::run(&config_path),
        Commands::Run { mine, sync } => commands::run::run(&config_path, mine, sync),
        Commands::Status => commands::status::run(&config_path),
    }
}
