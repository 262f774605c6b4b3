//! `ddb add`: fingerprints, parses and indexes one or more paths.

use crate::cli::AddArgs;
use crate::output::OutputWriter;
use anyhow::{bail, Result};
use dronedb_core::path_resolver;
use dronedb_parse::dsm::DsmClient;
use dronedb_parse::{fingerprint, parser};
use dronedb_store::Database;
use walkdir::WalkDir;

pub fn execute(args: AddArgs, output: &OutputWriter, continue_on_error: bool) -> Result<()> {
    let db = Database::open(&args.root, false)?;
    let config = crate::config::load(db.root(), Default::default())?;
    let dsm = DsmClient::from_config(&config);

    if args.paths.is_empty() {
        bail!("no paths given to add");
    }

    let mut any_error = false;
    for requested in &args.paths {
        let abs_requested = if requested.is_absolute() { requested.clone() } else { db.root().join(requested) };

        let walker = if args.recursive {
            WalkDir::new(&abs_requested)
        } else {
            WalkDir::new(&abs_requested).max_depth(0)
        };

        for dir_entry in walker {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    any_error = true;
                    output.error_line(&requested.display().to_string(), e);
                    continue;
                }
            };
            let abs_path = dir_entry.path();
            let is_dir = dir_entry.file_type().is_dir();

            let rel_path = match path_resolver::normalize(db.root(), abs_path) {
                Ok(p) => p,
                Err(e) => {
                    any_error = true;
                    output.error_line(&abs_path.display().to_string(), e);
                    continue;
                }
            };
            if rel_path.is_empty() || path_resolver::check_not_protected(&rel_path).is_err() {
                continue;
            }

            match add_one(&db, &rel_path, abs_path, is_dir, &dsm) {
                Ok(()) => output.entry_line('A', &rel_path),
                Err(e) => {
                    any_error = true;
                    output.error_line(&rel_path, e);
                }
            }
        }
    }

    if any_error && !continue_on_error {
        bail!("one or more paths failed to index");
    }
    Ok(())
}

fn add_one(
    db: &Database,
    rel_path: &str,
    abs_path: &std::path::Path,
    is_dir: bool,
    dsm: &DsmClient,
) -> Result<(), dronedb_core::error::DdbError> {
    let fp = fingerprint::fingerprint(abs_path, is_dir)?;
    let entry = parser::parse(rel_path, abs_path, fp, dsm)?;
    db.upsert_entry(&entry)
}
