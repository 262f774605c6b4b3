//! Build Orchestrator (spec §4.8): drives one buildable entry's derived
//! artifact through lock acquisition, temp-folder build, and atomic
//! publish, plus the pending-file retry machinery for dependency-missing
//! failures.

use crate::build_lock::BuildLock;
use crate::builders::{self, Builder};
use crate::thread_lock::LockRegistry;
use dronedb_core::entry::{Entry, EntryType};
use dronedb_core::error::{DdbError, Result};
use dronedb_store::Database;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Dependency sidecar extension -> primary file extension it belongs to
/// (spec §4.8's dependency-triggered rebuild rule).
const DEPENDENCY_PRIMARY_EXT: &[(&str, &str)] = &[("dbf", "shp"), ("shx", "shp"), ("prj", "shp"), ("cpg", "shp"), ("mtl", "obj")];

/// Sidecar extensions a primary file of the given extension requires
/// before it can be built (spec §4.5's sidecar enumeration, promoted to a
/// hard build precondition).
const REQUIRED_SIDECARS: &[(&str, &[&str])] = &[("shp", &["dbf", "shx"]), ("obj", &["mtl"])];

pub type BuildCallback<'a> = dyn FnMut(&str, &Path) + 'a;

pub struct BuildOrchestrator<'a> {
    db: &'a Database,
    root: PathBuf,
    build_root: PathBuf,
    locks: LockRegistry,
    pending_backoff_secs: u64,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(db: &'a Database, pending_backoff_secs: u64) -> Self {
        let root = db.root().to_path_buf();
        let build_root = root.join(".ddb").join("build");
        Self { db, root, build_root, locks: LockRegistry::new(), pending_backoff_secs }
    }

    /// Returns the build-folder subfolder name for `path`, or `None` if
    /// it's not buildable and not a recognized dependency sidecar.
    pub fn is_buildable(&self, path: &str) -> Option<&'static str> {
        if let Some(entry) = self.db.get_entry(path).ok().flatten() {
            if let Some(sub) = builders::subfolder_for(entry.r#type) {
                return Some(sub);
            }
        }
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        DEPENDENCY_PRIMARY_EXT
            .iter()
            .find(|(dep_ext, _)| *dep_ext == ext)
            .map(|_| "vec")
    }

    /// True iff any `.pending` file exists under the build root.
    pub fn is_build_pending(&self) -> Result<bool> {
        if !self.build_root.is_dir() {
            return Ok(false);
        }
        for entry in std::fs::read_dir(&self.build_root).map_err(|e| DdbError::fs(&self.build_root, e.to_string()))? {
            let entry = entry.map_err(|e| DdbError::fs(&self.build_root, e.to_string()))?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("pending") {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True iff a build lock is currently held for `path`'s artifact.
    pub fn is_build_active(&self, path: &str) -> Result<bool> {
        let Some(entry) = self.db.get_entry(path)? else { return Ok(false) };
        let Some(subfolder) = builders::subfolder_for(entry.r#type) else { return Ok(false) };
        let output = self.build_root.join(&entry.hash).join(subfolder);
        let lock_path = {
            let mut s = output.into_os_string();
            s.push(".building");
            PathBuf::from(s)
        };
        Ok(lock_path.exists())
    }

    /// Builds one entry. Redirects to the primary file when `path` names a
    /// dependency sidecar; silently no-ops if that primary isn't indexed.
    pub fn build(&self, path: &str, force: bool, mut callback: Option<&mut BuildCallback>) -> Result<Option<PathBuf>> {
        if let Some(primary) = dependency_primary_path(path) {
            return match self.db.get_entry(&primary)? {
                Some(_) => self.build(&primary, true, callback),
                None => Ok(None),
            };
        }

        let Some(entry) = self.db.get_entry(path)? else {
            return Err(DdbError::Index(format!("no such entry: {path}")));
        };
        let Some(subfolder) = builders::subfolder_for(entry.r#type) else {
            return Ok(None);
        };

        let base = self.build_root.join(&entry.hash);
        let output = base.join(subfolder);
        if output.exists() && !force {
            return Ok(Some(output));
        }

        let _lock = self.locks.acquire(format!("build-{}/{}", self.root.display(), entry.hash));

        let abs_source = self.root.join(&entry.path);
        if let Some(missing) = missing_dependencies(&entry, &abs_source) {
            return Err(DdbError::BuildDepMissing { deps: missing });
        }

        std::fs::create_dir_all(&base).map_err(|e| DdbError::fs(&base, e.to_string()))?;
        let pending_path = pending_path_for(&self.build_root, &entry.hash);
        let _ = std::fs::remove_file(&pending_path);

        let builder: Box<dyn Builder> = builders::builder_for(entry.r#type)
            .ok_or_else(|| DdbError::NotImplemented(format!("no builder for {:?}", entry.r#type)))?;

        let build_lock = BuildLock::acquire(&output, false)?;
        let temp_dir = base.join(format!("{subfolder}-temp-{}", random_suffix()));
        std::fs::create_dir_all(&temp_dir).map_err(|e| DdbError::fs(&temp_dir, e.to_string()))?;

        let result = builder.build(&abs_source, &temp_dir);
        drop(build_lock);

        match result {
            Ok(()) => {
                if output.exists() {
                    let _ = std::fs::remove_dir_all(&output);
                }
                std::fs::rename(&temp_dir, &output).map_err(|e| DdbError::fs(&output, e.to_string()))?;
                if let Some(cb) = callback.as_deref_mut() {
                    cb(&entry.path, &output);
                }
                Ok(Some(output))
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&temp_dir);
                if let DdbError::BuildDepMissing { deps } = &e {
                    let _ = write_pending(&pending_path, deps);
                }
                Err(e)
            }
        }
    }

    /// Builds every PointCloud/GeoRaster/Model/Vector entry.
    pub fn build_all(&self, force: bool, mut callback: Option<&mut BuildCallback>) -> Result<Vec<String>> {
        let mut failures = Vec::new();
        for entry in self.db.query_all()? {
            if builders::subfolder_for(entry.r#type).is_none() {
                continue;
            }
            if let Err(e) = self.build(&entry.path, force, callback.as_deref_mut()) {
                tracing::warn!(path = %entry.path, error = %e, "build failed");
                failures.push(entry.path);
            }
        }
        Ok(failures)
    }

    /// Retries eligible `.pending` files (spec §4.8's backoff rule).
    pub fn build_pending(&self, force: bool, mut callback: Option<&mut BuildCallback>) -> Result<()> {
        if !self.build_root.is_dir() {
            return Ok(());
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        let mut pendings = Vec::new();
        for entry in std::fs::read_dir(&self.build_root).map_err(|e| DdbError::fs(&self.build_root, e.to_string()))? {
            let entry = entry.map_err(|e| DdbError::fs(&self.build_root, e.to_string()))?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("pending") {
                pendings.push(entry.path());
            }
        }

        for pending_path in pendings {
            let Ok((timestamp, deps)) = read_pending(&pending_path) else { continue };
            if !force && now.saturating_sub(timestamp) < self.pending_backoff_secs {
                continue;
            }

            let hash = pending_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let Some(entry) = self.db.query_all()?.into_iter().find(|e| e.hash == hash) else {
                let _ = std::fs::remove_file(&pending_path);
                continue;
            };

            let all_present = deps.iter().all(|dep| {
                self.db.get_entry(dep).ok().flatten().is_some() && self.root.join(dep).exists()
            });
            if !all_present && !force {
                continue;
            }

            let _ = std::fs::remove_file(&pending_path);
            if let Err(e) = self.build(&entry.path, true, callback.as_deref_mut()) {
                tracing::warn!(path = %entry.path, error = %e, "pending build retry failed");
            }
        }
        Ok(())
    }

    /// Removes `<build_root>/<hash>` for each hash in `hashes` (spec §4.6/§5:
    /// "the orchestrator emits parallel remove jobs ... when `remove_many`
    /// runs"). Call only with hashes no longer referenced by any surviving
    /// entry — the caller (`ddb rm`) is responsible for that check, since it
    /// already has the full entry set in hand after the SQL delete commits.
    /// A worker pool is appropriate here per spec §5; individual failures are
    /// logged and do not abort the rest of the batch, matching the SQL
    /// delete already having committed by the time this runs.
    pub fn remove_build_folders(&self, hashes: &[String]) {
        hashes.par_iter().for_each(|hash| {
            let folder = self.build_root.join(hash);
            if let Err(e) = std::fs::remove_dir_all(&folder) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(folder = %folder.display(), error = %e, "failed to remove build folder");
                }
            }
            let pending = pending_path_for(&self.build_root, hash);
            let _ = std::fs::remove_file(&pending);
        });
    }
}

fn dependency_primary_path(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let (_, primary_ext) = DEPENDENCY_PRIMARY_EXT.iter().find(|(dep_ext, _)| *dep_ext == ext)?;
    let stem = &path[..path.len() - ext.len() - 1];
    Some(format!("{stem}.{primary_ext}"))
}

fn missing_dependencies(entry: &Entry, abs_source: &Path) -> Option<Vec<String>> {
    let ext = abs_source.extension().and_then(|e| e.to_str())?.to_ascii_lowercase();
    let (_, required) = REQUIRED_SIDECARS.iter().find(|(e, _)| *e == ext)?;
    let dir = abs_source.parent().unwrap_or_else(|| Path::new("."));
    let stem = abs_source.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    let missing: Vec<String> = required
        .iter()
        .filter_map(|sidecar_ext| {
            let sidecar = dir.join(format!("{stem}.{sidecar_ext}"));
            if sidecar.exists() {
                None
            } else {
                let entry_dir = Path::new(&entry.path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
                Some(if entry_dir.is_empty() {
                    format!("{stem}.{sidecar_ext}")
                } else {
                    format!("{entry_dir}/{stem}.{sidecar_ext}")
                })
            }
        })
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(missing)
    }
}

fn pending_path_for(build_root: &Path, hash: &str) -> PathBuf {
    build_root.join(format!("{hash}.pending"))
}

fn write_pending(path: &Path, deps: &[String]) -> Result<()> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let mut content = format!("{now}\n");
    for dep in deps {
        content.push_str(dep);
        content.push('\n');
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DdbError::fs(parent, e.to_string()))?;
    }
    std::fs::write(path, content).map_err(|e| DdbError::fs(path, e.to_string()))
}

fn read_pending(path: &Path) -> Result<(u64, Vec<String>)> {
    let content = std::fs::read_to_string(path).map_err(|e| DdbError::fs(path, e.to_string()))?;
    let mut lines = content.lines();
    let timestamp: u64 = lines
        .next()
        .and_then(|l| l.parse().ok())
        .ok_or_else(|| DdbError::app(format!("malformed pending file: {}", path.display())))?;
    let deps = lines.map(str::to_string).collect();
    Ok((timestamp, deps))
}

fn random_suffix() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronedb_core::entry::path_depth;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_shp_entry(root: &Path) -> Entry {
        std::fs::write(root.join("shape.shp"), b"shp").unwrap();
        Entry {
            path: "shape.shp".to_string(),
            hash: "deadbeef".to_string(),
            r#type: EntryType::Vector,
            properties: json!({}),
            mtime: 0,
            size: 3,
            depth: path_depth("shape.shp"),
            point_geom: None,
            polygon_geom: None,
        }
    }

    #[test]
    fn is_buildable_recognizes_dependency_sidecars() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let orchestrator = BuildOrchestrator::new(&db, 300);
        assert_eq!(orchestrator.is_buildable("shape.dbf"), Some("vec"));
        assert_eq!(orchestrator.is_buildable("notes.txt"), None);
    }

    #[test]
    fn build_reports_missing_dependency_and_writes_pending_file() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let entry = sample_shp_entry(dir.path());
        db.upsert_entry(&entry).unwrap();

        let orchestrator = BuildOrchestrator::new(&db, 300);
        let err = orchestrator.build("shape.shp", false, None).unwrap_err();
        match err {
            DdbError::BuildDepMissing { deps } => {
                assert!(deps.iter().any(|d| d.ends_with("shape.dbf")));
            }
            other => panic!("expected BuildDepMissing, got {other:?}"),
        }
        let pending = dir.path().join(".ddb/build/deadbeef.pending");
        assert!(pending.exists());
    }

    #[test]
    fn dependency_redirect_silently_skips_unindexed_primary() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let orchestrator = BuildOrchestrator::new(&db, 300);
        let result = orchestrator.build("shape.dbf", false, None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn pending_retry_within_backoff_window_is_skipped() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let entry = sample_shp_entry(dir.path());
        db.upsert_entry(&entry).unwrap();
        let orchestrator = BuildOrchestrator::new(&db, 300);
        let _ = orchestrator.build("shape.shp", false, None);

        // Re-run immediately: too recent, must be skipped without touching
        // the pending file's timestamp.
        let pending = dir.path().join(".ddb/build/deadbeef.pending");
        let before = std::fs::read_to_string(&pending).unwrap();
        orchestrator.build_pending(false, None).unwrap();
        let after = std::fs::read_to_string(&pending).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_build_folders_deletes_each_hash_and_tolerates_missing_ones() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let orchestrator = BuildOrchestrator::new(&db, 300);

        let build_root = dir.path().join(".ddb/build");
        std::fs::create_dir_all(build_root.join("aaa").join("cog")).unwrap();
        std::fs::create_dir_all(build_root.join("bbb").join("ept")).unwrap();

        orchestrator.remove_build_folders(&["aaa".to_string(), "bbb".to_string(), "ccc-never-existed".to_string()]);

        assert!(!build_root.join("aaa").exists());
        assert!(!build_root.join("bbb").exists());
    }
}
