//! Dragnet CLI — scheduled post harvesting and lifecycle management.
//!
//! Harvests relevant posts from configured channels and guards them
//! through a worker-driven lifecycle with an audit trail.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
