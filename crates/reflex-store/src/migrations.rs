//! Database schema migrations.
//!
//! Migrations are an ordered, versioned list applied up to the current
//! target; the applied version is tracked in `schema_migrations`. Each
//! migration is additive only — the queue must survive an upgrade with
//! pending actions in it.

use rusqlite::Connection;
use tracing::info;

use reflex_core::error::ReflexError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// The schema version the current build targets.
pub const SCHEMA_VERSION: i64 = 2;

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: "
        CREATE TABLE IF NOT EXISTS triggers (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            title      TEXT NOT NULL DEFAULT '',
            flags      INTEGER NOT NULL DEFAULT 0,
            sort       INTEGER NOT NULL DEFAULT 0,
            hook       TEXT NOT NULL DEFAULT '',
            condition  TEXT NOT NULL DEFAULT '',
            actions    TEXT NOT NULL DEFAULT '',
            settings   TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_triggers_sort
            ON triggers (sort ASC);

        CREATE INDEX IF NOT EXISTS idx_triggers_hook
            ON triggers (hook);

        CREATE TABLE IF NOT EXISTS actions (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            title          TEXT NOT NULL DEFAULT '',
            parent_id      INTEGER NOT NULL DEFAULT 0,
            root_parent_id INTEGER NOT NULL DEFAULT 0,
            trigger_id     INTEGER NOT NULL DEFAULT 0,
            user_id        INTEGER NOT NULL DEFAULT 0,
            module         TEXT NOT NULL DEFAULT '',
            item_ids       TEXT NOT NULL DEFAULT '',
            settings       TEXT NOT NULL DEFAULT '',
            priority       INTEGER NOT NULL DEFAULT 0,
            created        INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            flags          INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_actions_queue_order
            ON actions (priority DESC, created ASC, id ASC);

        CREATE INDEX IF NOT EXISTS idx_actions_parent
            ON actions (parent_id);
        ",
    },
    Migration {
        version: 2,
        name: "action_claims",
        sql: "
        ALTER TABLE actions ADD COLUMN claimed_at INTEGER;

        CREATE INDEX IF NOT EXISTS idx_actions_unclaimed
            ON actions (priority DESC, created ASC, id ASC)
            WHERE claimed_at IS NULL;
        ",
    },
];

/// Run all pending migrations.
///
/// Safe to call on every startup: migrations already recorded in
/// `schema_migrations` are skipped.
pub fn run_migrations(conn: &Connection) -> Result<(), ReflexError> {
    migrate_to(conn, SCHEMA_VERSION)
}

fn migrate_to(conn: &Connection, target: i64) -> Result<(), ReflexError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ReflexError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ReflexError::Storage(format!("Failed to query migration version: {}", e)))?;

    for migration in MIGRATIONS {
        if migration.version <= current || migration.version > target {
            continue;
        }
        conn.execute_batch(migration.sql).map_err(|e| {
            ReflexError::Storage(format!(
                "Failed to apply migration v{} ({}): {}",
                migration.version, migration.name, e
            ))
        })?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(|e| ReflexError::Storage(format!("Failed to record migration: {}", e)))?;
        info!("Applied migration v{}: {}", migration.version, migration.name);
    }

    Ok(())
}

/// Drop the triggers table. Pending queue rows are untouched.
pub fn drop_triggers(conn: &Connection) -> Result<(), ReflexError> {
    conn.execute_batch("DROP TABLE IF EXISTS triggers;")
        .map_err(|e| ReflexError::Storage(format!("Failed to drop triggers table: {}", e)))
}

/// Drop the actions table, discarding any pending queue rows.
pub fn drop_actions(conn: &Connection) -> Result<(), ReflexError> {
    conn.execute_batch("DROP TABLE IF EXISTS actions;")
        .map_err(|e| ReflexError::Storage(format!("Failed to drop actions table: {}", e)))
}
