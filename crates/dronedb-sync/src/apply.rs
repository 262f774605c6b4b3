//! Delta application (spec §4.7): executes a computed [`Delta`] against a
//! working tree — removes first, then copies (which only rearrange
//! existing local bytes), then adds (which must be fetched from the
//! remote). Pull-time conflict detection compares against the last sync
//! stamp so a concurrently-modified local file is never silently clobbered.

use crate::delta::Delta;
use dronedb_core::error::{DdbError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// How to resolve a detected conflict instead of raising it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Raise the conflict error; caller decides (the default).
    DontMerge,
    /// The remote's version wins.
    KeepTheirs,
    /// The local version wins; the operation for that path is skipped.
    KeepOurs,
}

/// Trait boundary for fetching bytes named by `add`s; the actual transport
/// (HTTP registry client, local mount, etc.) is an external collaborator.
pub trait Fetcher {
    fn fetch(&self, remote_path: &str, local_dest: &Path) -> Result<()>;
}

/// Per-path modification state used for conflict detection, keyed by the
/// tree-relative path. `mtime` is compared against the sync stamp; `hash`
/// against the delta's expected pre-state.
pub struct LocalState<'a> {
    pub mtime_since_stamp: Box<dyn Fn(&str) -> bool + 'a>,
    pub current_hash: Box<dyn Fn(&str) -> Option<String> + 'a>,
    /// Expected pre-state hash for each add, as recorded in the destination
    /// tree at delta-computation time.
    pub expected_hash: HashMap<String, String>,
}

/// Applies `delta` to `root`, using `fetcher` for adds. Returns the list of
/// conflicts encountered; when `strategy` is `DontMerge`, the first
/// conflict aborts the whole apply and is returned as an `Err`.
pub fn apply(
    delta: &Delta,
    root: &Path,
    fetcher: &dyn Fetcher,
    local: &LocalState,
    strategy: MergeStrategy,
) -> Result<Vec<String>> {
    let mut conflicts = Vec::new();

    for path in &delta.removes {
        if (local.mtime_since_stamp)(path) {
            match strategy {
                MergeStrategy::KeepOurs => {
                    conflicts.push(path.clone());
                    continue;
                }
                MergeStrategy::KeepTheirs => {}
                MergeStrategy::DontMerge => return Err(DdbError::RemoteDeleteLocalModified(path.clone())),
            }
        }
        let abs = root.join(path);
        if abs.is_dir() {
            let _ = fs::remove_dir_all(&abs);
        } else {
            let _ = fs::remove_file(&abs);
        }
    }

    for copy in &delta.copies {
        let src = root.join(&copy.source);
        let dst = root.join(&copy.destination);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        fs::copy(&src, &dst).map_err(|e| DdbError::fs(&dst, e.to_string()))?;
    }

    for path in &delta.adds {
        if let Some(current) = (local.current_hash)(path) {
            let expected = local.expected_hash.get(path);
            if expected.is_some_and(|e| e != &current) {
                match strategy {
                    MergeStrategy::KeepOurs => {
                        conflicts.push(path.clone());
                        continue;
                    }
                    MergeStrategy::KeepTheirs => {}
                    MergeStrategy::DontMerge => return Err(DdbError::BothModified(path.clone())),
                }
            }
        }
        let dst = root.join(path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
        }
        fetcher.fetch(path, &dst)?;
    }

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Copy;
    use tempfile::tempdir;

    struct NullFetcher;
    impl Fetcher for NullFetcher {
        fn fetch(&self, _remote_path: &str, local_dest: &Path) -> Result<()> {
            fs::write(local_dest, b"fetched").map_err(|e| DdbError::fs(local_dest, e.to_string()))
        }
    }

    #[test]
    fn copies_materialize_before_adds_fetch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("source.txt"), b"bytes").unwrap();
        let delta = Delta {
            adds: vec!["new.txt".to_string()],
            removes: vec![],
            copies: vec![Copy { source: "source.txt".to_string(), destination: "copy.txt".to_string() }],
        };
        let local =
            LocalState { mtime_since_stamp: Box::new(|_| false), current_hash: Box::new(|_| None), expected_hash: HashMap::new() };
        apply(&delta, dir.path(), &NullFetcher, &local, MergeStrategy::DontMerge).unwrap();
        assert_eq!(fs::read(dir.path().join("copy.txt")).unwrap(), b"bytes");
        assert_eq!(fs::read(dir.path().join("new.txt")).unwrap(), b"fetched");
    }

    #[test]
    fn remove_of_locally_modified_file_conflicts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stale.txt"), b"local edits").unwrap();
        let delta = Delta { adds: vec![], removes: vec!["stale.txt".to_string()], copies: vec![] };
        let local = LocalState {
            mtime_since_stamp: Box::new(|_| true),
            current_hash: Box::new(|_| None),
            expected_hash: HashMap::new(),
        };
        let err = apply(&delta, dir.path(), &NullFetcher, &local, MergeStrategy::DontMerge).unwrap_err();
        assert!(matches!(err, DdbError::RemoteDeleteLocalModified(_)));
    }

    #[test]
    fn both_modified_add_conflicts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), b"local bytes").unwrap();
        let delta = Delta { adds: vec!["x.txt".to_string()], removes: vec![], copies: vec![] };
        let mut expected_hash = HashMap::new();
        expected_hash.insert("x.txt".to_string(), "expected-hash".to_string());
        let local = LocalState {
            mtime_since_stamp: Box::new(|_| false),
            current_hash: Box::new(|_| Some("different-hash".to_string())),
            expected_hash,
        };
        let err = apply(&delta, dir.path(), &NullFetcher, &local, MergeStrategy::DontMerge).unwrap_err();
        assert!(matches!(err, DdbError::BothModified(_)));
    }

    #[test]
    fn keep_ours_strategy_records_conflict_instead_of_raising() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stale.txt"), b"local edits").unwrap();
        let delta = Delta { adds: vec![], removes: vec!["stale.txt".to_string()], copies: vec![] };
        let local = LocalState {
            mtime_since_stamp: Box::new(|_| true),
            current_hash: Box::new(|_| None),
            expected_hash: HashMap::new(),
        };
        let conflicts = apply(&delta, dir.path(), &NullFetcher, &local, MergeStrategy::KeepOurs).unwrap();
        assert_eq!(conflicts, vec!["stale.txt".to_string()]);
        assert!(dir.path().join("stale.txt").exists());
    }
}
