//! Rescan Driver (spec §4.13): re-parses already-indexed entries, forcing
//! a fresh hash (and therefore fresh metadata) even when mtime is
//! unchanged — this is the user-initiated "re-read the bytes" trigger.

use dronedb_core::entry::{Entry, EntryType};
use dronedb_core::error::{DdbError, Result};
use dronedb_parse::dsm::DsmClient;
use dronedb_parse::{fingerprint, parser};
use dronedb_store::Database;
use std::path::Path;

/// Per-entry outcome passed to the caller's callback; returning `false`
/// from the callback stops the rescan early (spec §4.13 step 4).
pub type RescanCallback<'a> = dyn FnMut(&Entry, bool, Option<&str>) -> bool + 'a;

pub struct RescanDriver<'a> {
    db: &'a Database,
    dsm: DsmClient,
}

impl<'a> RescanDriver<'a> {
    pub fn new(db: &'a Database, dsm: DsmClient) -> Self {
        Self { db, dsm }
    }

    /// Rescans entries whose type is in `types` (or every non-Directory
    /// entry when `types` is empty). `stop_on_error` controls whether a
    /// parse failure aborts the whole pass (raised immediately) or is
    /// reported to the callback and skipped.
    pub fn run(&self, types: &[EntryType], stop_on_error: bool, mut callback: Option<&mut RescanCallback>) -> Result<()> {
        let root = self.db.root().to_path_buf();
        let candidates: Vec<Entry> = self
            .db
            .query_all()?
            .into_iter()
            .filter(|e| {
                if e.r#type == EntryType::Directory {
                    return false;
                }
                types.is_empty() || types.contains(&e.r#type)
            })
            .collect();

        for old_entry in candidates {
            let abs_path = root.join(&old_entry.path);
            let result = rescan_one(&abs_path, &old_entry, &self.dsm);

            match result {
                Ok(new_entry) => {
                    self.db.upsert_entry(&new_entry)?;
                    let keep_going = callback.as_deref_mut().map(|cb| cb(&new_entry, true, None)).unwrap_or(true);
                    if !keep_going {
                        break;
                    }
                }
                Err(e) => {
                    if stop_on_error {
                        return Err(e);
                    }
                    let message = e.to_string();
                    let keep_going =
                        callback.as_deref_mut().map(|cb| cb(&old_entry, false, Some(&message))).unwrap_or(true);
                    if !keep_going {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn rescan_one(abs_path: &Path, old_entry: &Entry, dsm: &DsmClient) -> Result<Entry> {
    if !abs_path.is_file() {
        return Err(DdbError::fs(abs_path, "file listed in the index is missing"));
    }
    let fp = fingerprint::fingerprint(abs_path, false)?;
    parser::parse(&old_entry.path, abs_path, fp, dsm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronedb_core::config::LayeredConfig;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn sample_entry(path: &str, hash: &str) -> Entry {
        Entry {
            path: path.to_string(),
            hash: hash.to_string(),
            r#type: EntryType::Generic,
            properties: json!({}),
            mtime: 0,
            size: 0,
            depth: 0,
            point_geom: None,
            polygon_geom: None,
        }
    }

    #[test]
    fn rescan_recomputes_hash_even_without_mtime_change() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        fs::write(dir.path().join("notes.txt"), b"v1").unwrap();
        db.upsert_entry(&sample_entry("notes.txt", "stale-hash")).unwrap();

        let driver = RescanDriver::new(&db, DsmClient::from_config(&LayeredConfig::with_defaults()));
        driver.run(&[], false, None).unwrap();

        let refreshed = db.get_entry("notes.txt").unwrap().unwrap();
        assert_ne!(refreshed.hash, "stale-hash");
    }

    #[test]
    fn missing_file_reports_failure_without_stopping_by_default() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        db.upsert_entry(&sample_entry("gone.txt", "h")).unwrap();

        let driver = RescanDriver::new(&db, DsmClient::from_config(&LayeredConfig::with_defaults()));
        let mut failures = Vec::new();
        driver
            .run(
                &[],
                false,
                Some(&mut |entry, success, msg| {
                    if !success {
                        failures.push((entry.path.clone(), msg.map(str::to_string)));
                    }
                    true
                }),
            )
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "gone.txt");
    }

    #[test]
    fn stop_on_error_propagates_the_failure() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        db.upsert_entry(&sample_entry("gone.txt", "h")).unwrap();

        let driver = RescanDriver::new(&db, DsmClient::from_config(&LayeredConfig::with_defaults()));
        let err = driver.run(&[], true, None).unwrap_err();
        assert!(matches!(err, DdbError::Fs { .. }));
    }

    #[test]
    fn callback_returning_false_stops_early() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        db.upsert_entry(&sample_entry("a.txt", "h1")).unwrap();
        db.upsert_entry(&sample_entry("b.txt", "h2")).unwrap();

        let driver = RescanDriver::new(&db, DsmClient::from_config(&LayeredConfig::with_defaults()));
        let mut seen = 0;
        driver
            .run(
                &[],
                false,
                Some(&mut |_entry, _success, _msg| {
                    seen += 1;
                    false
                }),
            )
            .unwrap();
        assert_eq!(seen, 1);
    }
}
