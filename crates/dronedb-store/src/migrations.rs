//! Schema migration (spec §4.3): the `migrations` table holds a single
//! monotonically increasing version; on open we apply every migration
//! above the stored version, in order, inside one transaction. Each
//! migration is idempotent pure SQL (safe to re-run against an
//! already-current database, spec §8 property 9).

use crate::schema::{CREATE_V1, SCHEMA_VERSION};
use dronedb_core::error::{DdbError, Result};
use rusqlite::Connection;

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Ordered migrations applied after the v1 baseline. Each must be safe to
/// re-run: `DROP INDEX IF EXISTS` / `CREATE INDEX IF NOT EXISTS` style SQL
/// only, never a destructive rewrite of data that isn't itself idempotent.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "drop the redundant single-column entries_meta.path index; the \
                   composite (path, key) index already covers path-only lookups",
    sql: r#"
        DROP INDEX IF EXISTS idx_entries_meta_path;
        CREATE INDEX IF NOT EXISTS idx_entries_meta_path_key ON entries_meta(path, key);
        CREATE INDEX IF NOT EXISTS idx_entries_meta_key ON entries_meta(key);
    "#,
}];

fn to_db_err(e: rusqlite::Error) -> DdbError {
    DdbError::Sql(dronedb_core::error::rusqlite_error::SqlError(e.to_string()))
}

/// Reads the current schema version, defaulting to 0 for a brand new file
/// (no `migrations` row yet).
pub fn current_version(conn: &Connection) -> Result<i64> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='migrations'",
            [],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )
        .map_err(to_db_err)?;
    if !exists {
        return Ok(0);
    }
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM migrations", [], |row| row.get(0))
        .map_err(to_db_err)
}

/// Ensures the baseline schema exists and applies every migration whose
/// version is above the database's current version, in a single
/// transaction. Applying to an already-current database is a no-op.
pub fn ensure_up_to_date(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_V1).map_err(to_db_err)?;

    let current = current_version(conn)?;
    if current == 0 {
        conn.execute("INSERT INTO migrations (version) VALUES (1)", []).map_err(to_db_err)?;
    }

    let current = current_version(conn)?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.unchecked_transaction().map_err(to_db_err)?;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(version = migration.version, description = migration.description, "applying migration");
        tx.execute_batch(migration.sql).map_err(to_db_err)?;
        tx.execute("INSERT INTO migrations (version) VALUES (?1)", [migration.version]).map_err(to_db_err)?;
    }
    tx.commit().map_err(to_db_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn fresh_db_migrates_to_current_version() {
        let conn = fresh_conn();
        ensure_up_to_date(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn re_running_migrations_is_a_no_op() {
        let conn = fresh_conn();
        ensure_up_to_date(&conn).unwrap();
        let v1 = current_version(&conn).unwrap();
        ensure_up_to_date(&conn).unwrap();
        let v2 = current_version(&conn).unwrap();
        assert_eq!(v1, v2);
    }
}
