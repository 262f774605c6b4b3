//! `ddb init`

use crate::cli::InitArgs;
use crate::output::OutputWriter;
use anyhow::Result;
use dronedb_store::Database;

pub fn execute(args: InitArgs, output: &OutputWriter) -> Result<()> {
    let db = Database::open(&args.path, true)?;
    output.success(format!("initialized index at {}", db.root().display()));
    Ok(())
}
