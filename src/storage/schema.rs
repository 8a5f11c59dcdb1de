//! Cache database schema and migrations.

use rusqlite::Connection;

use crate::error::{OffcacheError, Result};

const CACHE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("../../migrations/001_cache_storage.sql"),
}];

/// Run schema migrations for the cache database.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in CACHE_MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| OffcacheError::Storage(format!("create schema_migrations: {e}")))?;

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| OffcacheError::Storage(format!("read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| OffcacheError::Storage(format!("begin migration: {e}")))?;

    tx.execute_batch(migration.sql).map_err(|e| {
        OffcacheError::Storage(format!("apply migration {}: {e}", migration.version))
    })?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| OffcacheError::Storage(format!("record migration {}: {e}", migration.version)))?;

    tx.commit().map_err(|e| {
        OffcacheError::Storage(format!("commit migration {}: {e}", migration.version))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in_memory() -> Connection {
        Connection::open_in_memory().expect("open in-memory db")
    }

    #[test]
    fn migrations_create_schema() {
        let mut conn = open_in_memory();
        let version = run_migrations(&mut conn).expect("run migrations");
        assert_eq!(version, 1);

        for table in ["caches", "cache_entries"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("query table existence");
            assert_eq!(exists, 1, "missing table {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = open_in_memory();
        assert_eq!(run_migrations(&mut conn).expect("first run"), 1);
        assert_eq!(run_migrations(&mut conn).expect("second run"), 1);

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .expect("count migrations");
        assert_eq!(count, 1);
    }
}
