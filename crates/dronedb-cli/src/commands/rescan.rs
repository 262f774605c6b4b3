//! `ddb rescan`

use crate::cli::RescanArgs;
use crate::output::OutputWriter;
use crate::rescan::RescanDriver;
use anyhow::{bail, Result};
use dronedb_core::entry::EntryType;
use dronedb_parse::dsm::DsmClient;
use dronedb_store::Database;

pub fn execute(args: RescanArgs, output: &OutputWriter, continue_on_error: bool) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(db.root(), Default::default())?;
    let dsm = DsmClient::from_config(&config);

    let mut types = Vec::with_capacity(args.types.len());
    for raw in &args.types {
        match EntryType::from_human(raw) {
            Some(t) => types.push(t),
            None => bail!("unknown entry type '{raw}'"),
        }
    }

    let driver = RescanDriver::new(&db, dsm);
    let mut any_error = false;
    driver.run(
        &types,
        args.stop_on_error,
        Some(&mut |entry, success, message| {
            if success {
                output.entry_line('U', &entry.path);
            } else {
                any_error = true;
                output.error_line(&entry.path, message.unwrap_or("rescan failed"));
            }
            true
        }),
    )?;

    if any_error {
        output.warning("one or more entries failed to rescan");
        if !continue_on_error {
            bail!("rescan completed with errors");
        }
    } else {
        output.success("rescan complete");
    }
    Ok(())
}
