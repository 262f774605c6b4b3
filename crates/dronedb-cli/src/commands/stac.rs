//! `ddb stac`: exports the index as a STAC Catalog/Collection/Item tree
//! (spec §6.4).

use crate::cli::StacArgs;
use crate::output::OutputWriter;
use crate::stac;
use anyhow::Result;
use dronedb_store::Database;
use std::fs;

pub fn execute(args: StacArgs, output: &OutputWriter) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let entries = db.query_all()?;
    let extent = db.get_extent()?;

    fs::create_dir_all(&args.out)?;
    let items_dir = args.out.join("items");
    fs::create_dir_all(&items_dir)?;

    let mut item_ids = Vec::with_capacity(entries.len());
    for entry in &entries {
        if entry.r#type == dronedb_core::entry::EntryType::Directory {
            continue;
        }
        let item = stac::item(&args.collection_id, &args.collection_root, entry);
        let id = item["id"].as_str().unwrap_or_default().to_string();
        fs::write(items_dir.join(format!("{id}.json")), serde_json::to_vec_pretty(&item)?)?;
        item_ids.push(id);
    }

    let collection = stac::collection(&args.collection_id, extent, &item_ids);
    fs::write(args.out.join("collection.json"), serde_json::to_vec_pretty(&collection)?)?;

    let catalog = stac::catalog(&args.collection_id);
    fs::write(args.out.join("catalog.json"), serde_json::to_vec_pretty(&catalog)?)?;

    output.success(format!("exported {} item(s) to {}", item_ids.len(), args.out.display()));
    Ok(())
}
