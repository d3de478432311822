mod airtable;
mod cac;
mod categories;
mod cli;
mod config;
mod dates;
mod error;
mod fmt;
mod http;
mod kpi;
mod pipeline;
mod ratelimit;
mod reconcile;
mod record;
mod sources;
mod windows;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => cli::sync::run(&cli.args),
        Commands::Categories => cli::categories::run(&cli.args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
