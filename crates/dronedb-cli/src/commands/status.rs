//! `ddb status`: a summary of the index (spec §4.1-§4.9).

use crate::cli::StatusArgs;
use crate::output::OutputWriter;
use anyhow::Result;
use dronedb_build::BuildOrchestrator;
use dronedb_core::entry::EntryType;
use dronedb_store::Database;
use std::collections::BTreeMap;

pub fn execute(args: StatusArgs, output: &OutputWriter) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(db.root(), Default::default())?;
    let orchestrator = BuildOrchestrator::new(&db, config.build_pending_backoff_secs.value);

    let entries = db.query_all()?;
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entry in &entries {
        *counts.entry(entry.r#type.to_human()).or_insert(0) += 1;
    }

    let extent = db.get_extent()?;
    let pending = orchestrator.is_build_pending()?;

    if output.is_json() {
        let buildable = entries.iter().filter(|e| e.r#type.is_buildable_candidate()).count();
        output.data(&serde_json::json!({
            "root": db.root(),
            "entries": entries.len(),
            "by_type": counts,
            "buildable": buildable,
            "extent_4326": extent,
            "build_pending": pending,
        }))?;
        return Ok(());
    }

    output.section("index");
    output.kv("root", db.root().display());
    output.kv("entries", entries.len());
    for (type_name, count) in &counts {
        if *type_name != EntryType::Directory.to_human() {
            output.kv(type_name, count);
        }
    }
    match extent {
        Some((min_lon, min_lat, max_lon, max_lat)) => {
            output.kv("extent (EPSG:4326)", format!("[{min_lon}, {min_lat}, {max_lon}, {max_lat}]"))
        }
        None => output.kv("extent (EPSG:4326)", "none"),
    }
    output.kv("build pending", pending);
    Ok(())
}
