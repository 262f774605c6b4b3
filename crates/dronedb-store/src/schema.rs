//! The compiled-in current schema version and the baseline DDL it migrates
//! towards. Geometry columns are stored as JSON-encoded vertex arrays
//! rather than true SpatiaLite `POINT`/`POLYGON` types: the SQLite driver
//! and any spatial extension it loads are external collaborators per spec
//! §1, and the core only needs bbox-level spatial filtering, which a JSON
//! column plus an in-memory scan over `get_extent`/`spatial_query` gives us
//! without depending on a native extension being present at runtime.

/// Current compiled-in schema version. Bump this and append a migration in
/// [`crate::migrations::MIGRATIONS`] whenever the schema changes.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_V1: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    path TEXT PRIMARY KEY,
    hash TEXT NOT NULL DEFAULT '',
    type INTEGER NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    mtime INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    point_geom TEXT,
    polygon_geom TEXT
);

CREATE INDEX IF NOT EXISTS idx_entries_type ON entries(type);
CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(hash);

CREATE TABLE IF NOT EXISTS entries_meta (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL DEFAULT '',
    key TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    mtime INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_entries_meta_path_key ON entries_meta(path, key);
CREATE INDEX IF NOT EXISTS idx_entries_meta_key ON entries_meta(key);

CREATE TABLE IF NOT EXISTS password (
    pwd TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER NOT NULL
);

-- Present for API compatibility with deployments that load a spatial
-- SQLite extension; left empty when none is loaded.
CREATE TABLE IF NOT EXISTS spatial_ref_sys (
    srid INTEGER PRIMARY KEY,
    auth_name TEXT,
    auth_srid INTEGER,
    ref_sys_name TEXT,
    proj4text TEXT
);
"#;
