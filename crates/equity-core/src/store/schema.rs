//! SQLite schema DDL and migration framework.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::EquityResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 2;

/// Core DDL statements: 5 CREATE TABLE + 2 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (5) ──────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS equities (
        symbol TEXT PRIMARY KEY
    );",
    "CREATE TABLE IF NOT EXISTS equity_names (
        symbol TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source TEXT,
        as_of TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS equity_membership (
        symbol TEXT NOT NULL,
        \"index\" TEXT NOT NULL,
        PRIMARY KEY (symbol, \"index\")
    );",
    // ── indexes (2) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_membership_index ON equity_membership(\"index\");",
    "CREATE INDEX IF NOT EXISTS idx_equities_upper ON equities(UPPER(symbol));",
];

/// Scratch tables used by the anti-join upserts. They live on the
/// connection that created them and are cleared before each use.
pub const STAGING_STATEMENTS: &[&str] = &[
    "CREATE TEMP TABLE IF NOT EXISTS staged_symbols (symbol TEXT PRIMARY KEY);",
    "CREATE TEMP TABLE IF NOT EXISTS staged_names (
        symbol TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );",
    "DELETE FROM temp.staged_symbols;",
    "DELETE FROM temp.staged_names;",
];

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations from the current stored version up to
/// [`SCHEMA_VERSION`]. Each step is wrapped in a SAVEPOINT so a failure
/// rolls back only that single step.
pub fn migrate_schema(conn: &Connection) -> EquityResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT equity_migrate_step;")?;

        let step_result = (|| -> EquityResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT equity_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                debug!(from = current_version, to = next_version, "schema_migrated");
                current_version = next_version;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT equity_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT equity_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                warn!(from = current_version, to = next_version, error = %e, "schema_migration_failed");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Read the current schema version from `store_meta`.
/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> EquityResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> EquityResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> EquityResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline, no-op.
fn migrate_to_v1(_conn: &Connection) -> EquityResult<()> {
    Ok(())
}

/// v1 -> v2: name tables written by older ingesters lack `source` and carry
/// the timestamp as `asof`.
fn migrate_to_v2(conn: &Connection) -> EquityResult<()> {
    let cols = table_columns(conn, "equity_names")?;
    if !cols.iter().any(|c| c == "source") {
        conn.execute_batch("ALTER TABLE equity_names ADD COLUMN source TEXT;")?;
    }
    if !cols.iter().any(|c| c == "as_of") {
        if cols.iter().any(|c| c == "asof") {
            conn.execute_batch("ALTER TABLE equity_names RENAME COLUMN asof TO as_of;")?;
        } else {
            conn.execute_batch("ALTER TABLE equity_names ADD COLUMN as_of TIMESTAMP;")?;
        }
    }
    Ok(())
}
