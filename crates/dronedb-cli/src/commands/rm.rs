//! `ddb rm`

use crate::cli::RmArgs;
use crate::output::OutputWriter;
use anyhow::{bail, Result};
use dronedb_build::BuildOrchestrator;
use dronedb_core::path_resolver;
use dronedb_store::Database;
use std::collections::HashSet;

pub fn execute(args: RmArgs, output: &OutputWriter, continue_on_error: bool) -> Result<()> {
    let db = Database::open(&args.root, false)?;

    let mut removable = Vec::new();
    let mut removed_hashes = Vec::new();
    let mut any_error = false;
    for path in &args.paths {
        if path_resolver::check_not_protected(path).is_err() {
            any_error = true;
            output.error_line(path, "refusing to remove a path under the protected .ddb/ prefix");
            continue;
        }
        match db.get_entry(path)? {
            Some(entry) => {
                removed_hashes.push(entry.hash);
                removable.push(path.clone());
            }
            None => {
                any_error = true;
                output.error_line(path, "no such entry");
            }
        }
    }

    db.remove_entries(&removable)?;
    for path in &removable {
        output.entry_line('D', path);
    }

    // Build-folder cleanup (spec §4.6/§5): a hash only gets its
    // `.ddb/build/<hash>` folder removed once no surviving entry still
    // references it, since two paths can share a hash.
    if !removed_hashes.is_empty() {
        let still_referenced: HashSet<String> = db.query_all()?.into_iter().map(|e| e.hash).collect();
        removed_hashes.sort();
        removed_hashes.dedup();
        let orphaned: Vec<String> = removed_hashes.into_iter().filter(|h| !still_referenced.contains(h)).collect();
        if !orphaned.is_empty() {
            let config = crate::config::load(db.root(), Default::default())?;
            let orchestrator = BuildOrchestrator::new(&db, config.build_pending_backoff_secs.value);
            orchestrator.remove_build_folders(&orphaned);
        }
    }

    if any_error && !continue_on_error {
        bail!("one or more paths could not be removed");
    }
    Ok(())
}
