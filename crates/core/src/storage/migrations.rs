//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Conferences table
            CREATE TABLE IF NOT EXISTS conferences (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT,
                host_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                conference_type TEXT NOT NULL DEFAULT 'SCHEDULED',
                max_participants INTEGER NOT NULL DEFAULT 50,
                language_from TEXT NOT NULL DEFAULT 'en',
                language_to TEXT NOT NULL DEFAULT 'vi',
                scheduled_at TEXT,
                started_at TEXT,
                ended_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (status IN ('PENDING', 'STARTED', 'PAUSED', 'ENDED', 'CANCELLED')),
                CHECK (conference_type IN ('INSTANT', 'SCHEDULED'))
            );

            -- Participants table (rows are kept after leaving)
            CREATE TABLE IF NOT EXISTS conference_participants (
                id TEXT PRIMARY KEY,
                conference_id TEXT NOT NULL,
                user_id TEXT,
                display_name TEXT NOT NULL,
                is_host INTEGER NOT NULL DEFAULT 0,
                can_speak INTEGER NOT NULL DEFAULT 1,
                is_muted INTEGER NOT NULL DEFAULT 0,
                joined_at TEXT NOT NULL,
                left_at TEXT,
                FOREIGN KEY (conference_id) REFERENCES conferences(id) ON DELETE CASCADE
            );

            -- Settings table
            CREATE TABLE IF NOT EXISTS conference_settings (
                id TEXT PRIMARY KEY,
                conference_id TEXT NOT NULL UNIQUE,
                auto_translate INTEGER NOT NULL DEFAULT 1,
                recording_enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (conference_id) REFERENCES conferences(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for query performance",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_conferences_host ON conferences(host_id);
            CREATE INDEX IF NOT EXISTS idx_participants_conference ON conference_participants(conference_id);
            CREATE INDEX IF NOT EXISTS idx_participants_present ON conference_participants(conference_id, left_at);
        "#,
    },
    Migration {
        version: 3,
        description: "Enforce one live conference per host",
        sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_conferences_one_live_per_host
                ON conferences(host_id) WHERE status IN ('STARTED', 'PAUSED');

            CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_one_host
                ON conference_participants(conference_id) WHERE is_host = 1;
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Get the latest migration version (test helper)
    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run twice
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_live_index_rejects_second_live_conference() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO conferences (id, code, title, host_id, status, created_at, updated_at)
                      VALUES (?1, ?2, 'T', 'host-1', ?3, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')";
        conn.execute(insert, rusqlite::params!["a", "aaa-aaaa-aaa", "STARTED"]).unwrap();
        conn.execute(insert, rusqlite::params!["b", "bbb-bbbb-bbb", "PENDING"]).unwrap();

        let err = conn
            .execute(insert, rusqlite::params!["c", "ccc-cccc-ccc", "PAUSED"])
            .unwrap_err();
        assert!(super::super::parse::is_constraint_violation(&err));
    }

    #[test]
    fn test_migrations_sequential() {
        // Verify migrations are numbered sequentially
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }
}
