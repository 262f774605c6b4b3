//! `ddb sync`: computes and applies the delta between this index and
//! another index root (spec §4.7). The real Registry/PushManager HTTP
//! client is an external collaborator (spec §2); here `remote_root` is
//! another on-disk index, and [`LocalFetcher`] copies bytes straight off
//! its filesystem instead of over the wire.

use crate::cli::{MergeStrategyArg, SyncArgs};
use crate::output::OutputWriter;
use anyhow::Result;
use dronedb_core::error::{DdbError, Result as DdbResult};
use dronedb_store::Database;
use dronedb_sync::apply::{apply, Fetcher, LocalState, MergeStrategy};
use dronedb_sync::delta::{compute, TreeEntry};
use std::collections::HashMap;
use std::path::Path;

struct LocalFetcher<'a> {
    remote_root: &'a Path,
}

impl Fetcher for LocalFetcher<'_> {
    fn fetch(&self, remote_path: &str, local_dest: &Path) -> DdbResult<()> {
        let src = self.remote_root.join(remote_path);
        if let Some(parent) = local_dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        std::fs::copy(&src, local_dest).map_err(|e| DdbError::fs(local_dest, e.to_string()))?;
        Ok(())
    }
}

fn as_tree(entries: &[dronedb_core::entry::Entry]) -> Vec<TreeEntry> {
    entries.iter().map(|e| TreeEntry::new(e.path.clone(), e.hash.clone(), e.r#type)).collect()
}

pub fn execute(args: SyncArgs, output: &OutputWriter) -> Result<()> {
    let local_db = Database::open(&args.root, false)?;
    let remote_db = Database::open(&args.remote_root, false)?;

    let local_entries = local_db.query_all()?;
    let remote_entries = remote_db.query_all()?;

    // "source" is the remote's tree: the delta reconciles local -> remote.
    let delta = compute(&as_tree(&remote_entries), &as_tree(&local_entries));

    if output.is_json() {
        output.data(&delta)?;
    } else {
        output.section("delta");
        for path in &delta.adds {
            output.entry_line('A', path);
        }
        for path in &delta.removes {
            output.entry_line('D', path);
        }
        for copy in &delta.copies {
            output.info(format!("copy {} -> {}", copy.source, copy.destination));
        }
    }

    if args.dry_run {
        output.info("dry run: nothing applied");
        return Ok(());
    }

    let local_by_path: HashMap<String, String> =
        local_entries.iter().map(|e| (e.path.clone(), e.hash.clone())).collect();
    let expected_hash: HashMap<String, String> =
        local_entries.iter().map(|e| (e.path.clone(), e.hash.clone())).collect();

    let local_state = LocalState {
        mtime_since_stamp: Box::new(|_path: &str| false),
        current_hash: Box::new(move |path: &str| local_by_path.get(path).cloned()),
        expected_hash,
    };

    let strategy = match args.merge_strategy {
        MergeStrategyArg::DontMerge => MergeStrategy::DontMerge,
        MergeStrategyArg::KeepTheirs => MergeStrategy::KeepTheirs,
        MergeStrategyArg::KeepOurs => MergeStrategy::KeepOurs,
    };

    let fetcher = LocalFetcher { remote_root: remote_db.root() };
    let conflicts = apply(&delta, local_db.root(), &fetcher, &local_state, strategy)?;

    for entry in &remote_entries {
        if delta.adds.contains(&entry.path) || delta.copies.iter().any(|c| c.destination == entry.path) {
            local_db.upsert_entry(entry)?;
        }
    }
    if !conflicts.is_empty() {
        local_db.remove_entries(&delta.removes.iter().cloned().filter(|p| !conflicts.contains(p)).collect::<Vec<_>>())?;
    } else {
        local_db.remove_entries(&delta.removes)?;
    }

    if conflicts.is_empty() {
        output.success("sync complete");
    } else {
        output.warning(format!("sync complete with {} conflict(s) kept as local", conflicts.len()));
    }
    Ok(())
}
