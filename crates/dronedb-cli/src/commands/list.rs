//! `ddb list`

use crate::cli::ListArgs;
use crate::output::OutputWriter;
use anyhow::Result;
use dronedb_core::path_resolver::{self, Pattern};
use dronedb_store::Database;
use tabled::Tabled;

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Type")]
    r#type: String,
    #[tabled(rename = "Size")]
    size: i64,
}

pub fn execute(args: ListArgs, output: &OutputWriter) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let entries = db.query_all()?;

    let matched_paths: Vec<String> = match &args.pattern {
        None => entries.iter().map(|e| e.path.clone()).collect(),
        Some(raw) => {
            let pattern = Pattern::compile(raw)?;
            let lookup: Vec<(String, i32)> = entries.iter().map(|e| (e.path.clone(), e.depth)).collect();
            path_resolver::resolve_listing(&lookup, &pattern, args.recursive, args.max_depth)
                .into_iter()
                .map(str::to_string)
                .collect()
        }
    };

    if output.is_json() {
        let matched: Vec<_> = entries.iter().filter(|e| matched_paths.contains(&e.path)).collect();
        output.data(&matched)?;
        return Ok(());
    }

    let rows: Vec<Row> = entries
        .iter()
        .filter(|e| matched_paths.contains(&e.path))
        .map(|e| Row { path: e.path.clone(), r#type: e.r#type.to_human().to_string(), size: e.size })
        .collect();
    output.table(rows);
    Ok(())
}
