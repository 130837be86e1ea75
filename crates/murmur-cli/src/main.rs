//! Murmur CLI - run dataflow patches offline.

mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use murmur_config::EngineConfig;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version, about = "Murmur dataflow engine CLI", long_about = None)]
struct Cli {
    /// Engine configuration file (audio settings and log filter)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a patch to a WAV file
    Render(commands::render::RenderArgs),

    /// Print the compiled process order of a patch
    Order(commands::order::OrderArgs),

    /// List available units
    Units(commands::units::UnitsArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.logging.filter);

    match cli.command {
        Commands::Render(args) => commands::render::run(args, &config),
        Commands::Order(args) => commands::order::run(args, &config),
        Commands::Units(args) => commands::units::run(args),
    }
}

/// Logs to stderr, filtered by `RUST_LOG` or else the configured filter.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
