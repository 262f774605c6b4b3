//! Command implementations.

mod add;
mod build;
mod init;
mod list;
mod rescan;
mod rm;
mod stac;
mod status;
mod sync;
mod tile;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::Result;

pub fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let continue_on_error = cli.continue_on_error;
    let tile_size_override = cli.tile_size;

    match cli.command {
        Commands::Init(args) => init::execute(args, &output),
        Commands::Add(args) => add::execute(args, &output, continue_on_error),
        Commands::Rm(args) => rm::execute(args, &output, continue_on_error),
        Commands::List(args) => list::execute(args, &output),
        Commands::Build(args) => build::build(args, &output, continue_on_error),
        Commands::BuildPending(args) => build::build_pending(args, &output),
        Commands::Rescan(args) => rescan::execute(args, &output, continue_on_error),
        Commands::Tile(args) => tile::tile(args, &output, tile_size_override),
        Commands::Thumb(args) => tile::thumb(args, &output, tile_size_override),
        Commands::Stac(args) => stac::execute(args, &output),
        Commands::Sync(args) => sync::execute(args, &output),
        Commands::Status(args) => status::execute(args, &output),
    }
}
