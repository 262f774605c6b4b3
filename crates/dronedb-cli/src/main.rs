//! DroneDB CLI - command-line front end.
//!
//! Every command here runs to completion on the calling thread: the
//! scheduling model is parallel OS threads with blocking I/O for
//! disk/SQLite/subprocess calls, not a cooperative event loop, so there is
//! no `tokio::runtime::Runtime` here.

mod cli;
mod commands;
mod config;
mod errors;
mod output;
mod rescan;
mod stac;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = commands::execute(cli) {
        let cli_err = errors::from_anyhow(err);
        cli_err.display();
        std::process::exit(1);
    }
    Ok(())
}
