use anyhow::Result;
use clap::Parser;
use log::debug;

mod api;
mod cli;
mod config;
mod migrate;

use cli::commands::{copy, plan};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // RUST_LOG wins over -v flags
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    debug!("Starting viewcopy");

    match cli.command {
        Commands::Copy(args) => copy::handle_copy_command(args).await,
        Commands::Plan(args) => plan::handle_plan_command(args).await,
    }
}
