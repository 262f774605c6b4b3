//! The `Database` handle: a single `rusqlite::Connection` onto a
//! `.ddb/dbase.sqlite` file, plus the entry/meta/password CRUD spec §4.3 and
//! §6.2 describe. One process holds one connection per index (spec §5's
//! blocking concurrency model); there is no cross-thread connection pool.

use chrono::Utc;
use dronedb_core::entry::{path_depth, Entry, EntryMeta, EntryType};
use dronedb_core::error::{DdbError, Result};
use dronedb_core::hash::str_sha256;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::{Path, PathBuf};

const DDB_DIR: &str = ".ddb";
const DB_FILE: &str = "dbase.sqlite";

pub struct Database {
    conn: Connection,
    /// Directory containing `.ddb/`, i.e. the dataset root.
    root: PathBuf,
}

fn to_db_err(e: rusqlite::Error) -> DdbError {
    DdbError::Sql(dronedb_core::error::rusqlite_error::SqlError(e.to_string()))
}

impl Database {
    /// Opens the index rooted at or above `start`, walking upward looking
    /// for `.ddb/dbase.sqlite`. If none is found and `create_if_missing` is
    /// true, a fresh index is created at `start` itself.
    pub fn open(start: &Path, create_if_missing: bool) -> Result<Self> {
        if let Some(root) = find_root(start) {
            return Self::open_at(&root);
        }
        if !create_if_missing {
            return Err(DdbError::Index(format!(
                "no {} found at or above {}",
                DDB_DIR,
                start.display()
            )));
        }
        Self::create_at(start)
    }

    fn open_at(root: &Path) -> Result<Self> {
        let db_path = root.join(DDB_DIR).join(DB_FILE);
        let conn = Connection::open(&db_path).map_err(to_db_err)?;
        crate::migrations::ensure_up_to_date(&conn)?;
        Ok(Self { conn, root: root.to_path_buf() })
    }

    fn create_at(root: &Path) -> Result<Self> {
        let ddb_dir = root.join(DDB_DIR);
        std::fs::create_dir_all(&ddb_dir).map_err(|e| DdbError::fs(&ddb_dir, e.to_string()))?;
        tracing::info!(root = %root.display(), "creating new index");
        Self::open_at(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ---- entries ---------------------------------------------------

    pub fn get_entry(&self, path: &str) -> Result<Option<Entry>> {
        self.conn
            .query_row("SELECT * FROM entries WHERE path = ?1", params![path], row_to_entry)
            .optional()
            .map_err(to_db_err)
    }

    /// Inserts or replaces `entry`; `path` is the primary key.
    pub fn upsert_entry(&self, entry: &Entry) -> Result<()> {
        entry.validate().map_err(DdbError::Index)?;
        let point_geom = entry.point_geom.map(|v| serde_json::to_string(&v)).transpose()?;
        let polygon_geom = entry.polygon_geom.as_ref().map(serde_json::to_string).transpose()?;
        self.conn
            .execute(
                "INSERT INTO entries (path, hash, type, properties, mtime, size, depth, point_geom, polygon_geom)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(path) DO UPDATE SET
                    hash = excluded.hash, type = excluded.type, properties = excluded.properties,
                    mtime = excluded.mtime, size = excluded.size, depth = excluded.depth,
                    point_geom = excluded.point_geom, polygon_geom = excluded.polygon_geom",
                params![
                    entry.path,
                    entry.hash,
                    entry.r#type.as_u8(),
                    entry.properties.to_string(),
                    entry.mtime,
                    entry.size,
                    entry.depth,
                    point_geom,
                    polygon_geom,
                ],
            )
            .map_err(to_db_err)?;
        Ok(())
    }

    /// Removes the named entries and cascades to their meta rows.
    pub fn remove_entries(&self, paths: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(to_db_err)?;
        for path in paths {
            tx.execute("DELETE FROM entries WHERE path = ?1", params![path]).map_err(to_db_err)?;
            tx.execute("DELETE FROM entries_meta WHERE path = ?1", params![path]).map_err(to_db_err)?;
        }
        tx.commit().map_err(to_db_err)?;
        Ok(())
    }

    pub fn query_all(&self) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare("SELECT * FROM entries ORDER BY path").map_err(to_db_err)?;
        let rows = stmt.query_map([], row_to_entry).map_err(to_db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(to_db_err)
    }

    /// Lists entries whose path is a direct child of `parent` (spec §4.3
    /// listing support; full pattern/recursive resolution lives in
    /// `dronedb_core::path_resolver`).
    pub fn query_children(&self, parent: &str) -> Result<Vec<Entry>> {
        let all = self.query_all()?;
        let parent_depth = if parent.is_empty() { -1 } else { path_depth(parent) };
        Ok(all
            .into_iter()
            .filter(|e| {
                if parent.is_empty() {
                    e.depth == 0
                } else {
                    e.path.starts_with(&format!("{parent}/")) && e.depth == parent_depth + 1
                }
            })
            .collect())
    }

    /// The bounding box of every entry carrying geometry, or `None` if the
    /// index has no georeferenced entries.
    pub fn get_extent(&self) -> Result<Option<(f64, f64, f64, f64)>> {
        let entries = self.query_all()?;
        let mut extent: Option<(f64, f64, f64, f64)> = None;
        let mut fold = |lon: f64, lat: f64, extent: &mut Option<(f64, f64, f64, f64)>| match extent {
            Some((min_lon, min_lat, max_lon, max_lat)) => {
                *min_lon = min_lon.min(lon);
                *min_lat = min_lat.min(lat);
                *max_lon = max_lon.max(lon);
                *max_lat = max_lat.max(lat);
            }
            None => *extent = Some((lon, lat, lon, lat)),
        };
        for e in &entries {
            if let Some((lon, lat, _)) = e.point_geom {
                fold(lon, lat, &mut extent);
            }
            if let Some(ring) = &e.polygon_geom {
                for (lon, lat, _) in ring {
                    fold(*lon, *lat, &mut extent);
                }
            }
        }
        Ok(extent)
    }

    // ---- entry metadata ---------------------------------------------

    pub fn get_meta(&self, path: &str, key: &str) -> Result<Vec<EntryMeta>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM entries_meta WHERE path = ?1 AND key = ?2 ORDER BY mtime")
            .map_err(to_db_err)?;
        let rows = stmt.query_map(params![path, key], row_to_meta).map_err(to_db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(to_db_err)
    }

    /// Appends a new meta record for a plural (list-valued) key.
    pub fn add_meta(&self, path: &str, key: &str, data: Value) -> Result<EntryMeta> {
        dronedb_core::entry::validate_key(key).map_err(DdbError::Index)?;
        let mtime = Utc::now().timestamp();
        let id = str_sha256(&format!("{path}:{key}:{data}:{mtime}"));
        self.conn
            .execute(
                "INSERT INTO entries_meta (id, path, key, data, mtime) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, path, key, data.to_string(), mtime],
            )
            .map_err(to_db_err)?;
        Ok(EntryMeta { id, path: path.to_string(), key: key.to_string(), data, mtime })
    }

    /// Replaces every record for a scalar key (e.g. `"config"`) with one.
    pub fn set_meta(&self, path: &str, key: &str, data: Value) -> Result<EntryMeta> {
        let tx = self.conn.unchecked_transaction().map_err(to_db_err)?;
        tx.execute("DELETE FROM entries_meta WHERE path = ?1 AND key = ?2", params![path, key])
            .map_err(to_db_err)?;
        let mtime = Utc::now().timestamp();
        let id = str_sha256(&format!("{path}:{key}:{data}:{mtime}"));
        tx.execute(
            "INSERT INTO entries_meta (id, path, key, data, mtime) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, path, key, data.to_string(), mtime],
        )
        .map_err(to_db_err)?;
        tx.commit().map_err(to_db_err)?;
        Ok(EntryMeta { id, path: path.to_string(), key: key.to_string(), data, mtime })
    }

    pub fn unset_meta(&self, path: &str, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM entries_meta WHERE path = ?1 AND key = ?2", params![path, key])
            .map_err(to_db_err)?;
        Ok(())
    }

    pub fn remove_meta_by_id(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM entries_meta WHERE id = ?1", params![id]).map_err(to_db_err)?;
        Ok(())
    }

    /// Global (dataset-level) properties, stored as meta on the empty path.
    pub fn get_properties(&self) -> Result<Value> {
        Ok(self
            .get_meta("", "config")?
            .into_iter()
            .next()
            .map(|m| m.data)
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    pub fn set_properties(&self, data: Value) -> Result<()> {
        self.set_meta("", "config", data)?;
        Ok(())
    }

    /// The dataset README, stored as a scalar meta key (spec §6.2).
    pub fn get_readme(&self) -> Result<Option<String>> {
        Ok(self
            .get_meta("", "readme")?
            .into_iter()
            .next()
            .and_then(|m| m.data.as_str().map(|s| s.to_string())))
    }

    pub fn set_readme(&self, text: &str) -> Result<()> {
        self.set_meta("", "readme", Value::String(text.to_string()))?;
        Ok(())
    }

    // ---- password ----------------------------------------------------

    /// Appends a new accepted password hash (spec §2 credential storage).
    /// Matches the original append-only semantics: any previously stored
    /// hash remains valid until the table is explicitly cleared.
    pub fn set_password(&self, hash: &str) -> Result<()> {
        self.conn.execute("INSERT INTO password (pwd) VALUES (?1)", params![hash]).map_err(to_db_err)?;
        Ok(())
    }

    /// True if `candidate_hash` matches any stored password hash, or if no
    /// password has ever been set (an unlocked index).
    pub fn verify_password(&self, candidate_hash: &str) -> Result<bool> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM password", [], |r| r.get(0)).map_err(to_db_err)?;
        if count == 0 {
            return Ok(true);
        }
        let matches: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM password WHERE pwd = ?1", params![candidate_hash], |r| r.get(0))
            .map_err(to_db_err)?;
        Ok(matches > 0)
    }

    pub fn clear_password(&self) -> Result<()> {
        self.conn.execute("DELETE FROM password", []).map_err(to_db_err)?;
        Ok(())
    }
}

/// Walks from `start` upward looking for a `.ddb` directory, stopping at
/// the filesystem root.
fn find_root(start: &Path) -> Option<PathBuf> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        if dir.join(DDB_DIR).join(DB_FILE).is_file() {
            return Some(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    None
}

fn row_to_entry(row: &Row) -> rusqlite::Result<Entry> {
    let type_tag: u8 = row.get("type")?;
    let properties_text: String = row.get("properties")?;
    let point_geom_text: Option<String> = row.get("point_geom")?;
    let polygon_geom_text: Option<String> = row.get("polygon_geom")?;
    Ok(Entry {
        path: row.get("path")?,
        hash: row.get("hash")?,
        r#type: EntryType::from_u8(type_tag).unwrap_or(EntryType::Undefined),
        properties: serde_json::from_str(&properties_text).unwrap_or(Value::Null),
        mtime: row.get("mtime")?,
        size: row.get("size")?,
        depth: row.get("depth")?,
        point_geom: point_geom_text.and_then(|s| serde_json::from_str(&s).ok()),
        polygon_geom: polygon_geom_text.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn row_to_meta(row: &Row) -> rusqlite::Result<EntryMeta> {
    let data_text: String = row.get("data")?;
    Ok(EntryMeta {
        id: row.get("id")?,
        path: row.get("path")?,
        key: row.get("key")?,
        data: serde_json::from_str(&data_text).unwrap_or(Value::Null),
        mtime: row.get("mtime")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronedb_core::entry::EntryType;
    use tempfile::tempdir;

    fn sample_entry(path: &str) -> Entry {
        Entry {
            path: path.to_string(),
            hash: str_sha256(path),
            r#type: EntryType::Generic,
            properties: Value::Object(Default::default()),
            mtime: 1000,
            size: 42,
            depth: path_depth(path),
            point_geom: None,
            polygon_geom: None,
        }
    }

    #[test]
    fn create_then_reopen_finds_existing_index() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), true).unwrap();
            db.upsert_entry(&sample_entry("a.jpg")).unwrap();
        }
        let nested = dir.path().join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        let db = Database::open(&nested, false).unwrap();
        assert!(db.get_entry("a.jpg").unwrap().is_some());
    }

    #[test]
    fn upsert_is_idempotent_by_path() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        db.upsert_entry(&sample_entry("a.jpg")).unwrap();
        let mut updated = sample_entry("a.jpg");
        updated.size = 100;
        db.upsert_entry(&updated).unwrap();
        assert_eq!(db.query_all().unwrap().len(), 1);
        assert_eq!(db.get_entry("a.jpg").unwrap().unwrap().size, 100);
    }

    #[test]
    fn removing_entry_cascades_its_meta() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        db.upsert_entry(&sample_entry("a.jpg")).unwrap();
        db.add_meta("a.jpg", "annotations", serde_json::json!({"note": "x"})).unwrap();
        db.remove_entries(&["a.jpg".to_string()]).unwrap();
        assert!(db.get_meta("a.jpg", "annotations").unwrap().is_empty());
    }

    #[test]
    fn scalar_meta_key_is_replaced_not_appended() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        db.set_properties(serde_json::json!({"name": "one"})).unwrap();
        db.set_properties(serde_json::json!({"name": "two"})).unwrap();
        assert_eq!(db.get_meta("", "config").unwrap().len(), 1);
        assert_eq!(db.get_properties().unwrap()["name"], "two");
    }

    #[test]
    fn password_verify_accepts_any_stored_hash() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        assert!(db.verify_password("anything").unwrap(), "unlocked index accepts any password");
        db.set_password("h1").unwrap();
        db.set_password("h2").unwrap();
        assert!(db.verify_password("h1").unwrap());
        assert!(db.verify_password("h2").unwrap());
        assert!(!db.verify_password("h3").unwrap());
    }

    #[test]
    fn extent_spans_points_and_polygons() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), true).unwrap();
        let mut e1 = sample_entry("a.jpg");
        e1.point_geom = Some((10.0, 20.0, 0.0));
        let mut e2 = sample_entry("b.jpg");
        e2.polygon_geom = Some(vec![(0.0, 0.0, 0.0), (30.0, 0.0, 0.0), (30.0, 40.0, 0.0), (0.0, 0.0, 0.0)]);
        db.upsert_entry(&e1).unwrap();
        db.upsert_entry(&e2).unwrap();
        let (min_lon, min_lat, max_lon, max_lat) = db.get_extent().unwrap().unwrap();
        assert_eq!((min_lon, min_lat, max_lon, max_lat), (0.0, 0.0, 30.0, 40.0));
    }
}
