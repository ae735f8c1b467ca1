//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration transforms the schema
//! from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per repository; other tables refer to repo_key
        CREATE TABLE repos (
            repo_key INTEGER PRIMARY KEY,
            owner BLOB NOT NULL,              -- 32 bytes, Ed25519 public key
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(owner, name)
        );

        -- Immutable commits
        CREATE TABLE commits (
            repo_key INTEGER NOT NULL REFERENCES repos(repo_key),
            commit_id BLOB NOT NULL,          -- CommitId binary form
            level INTEGER NOT NULL,
            body BLOB NOT NULL,               -- canonical commit encoding
            ingested_at INTEGER NOT NULL,
            PRIMARY KEY (repo_key, commit_id)
        );

        -- Parent index
        CREATE TABLE commit_parents (
            repo_key INTEGER NOT NULL,
            child BLOB NOT NULL,
            parent BLOB NOT NULL,
            PRIMARY KEY (repo_key, child, parent)
        );

        -- Current signed heads
        CREATE TABLE heads (
            repo_key INTEGER NOT NULL,
            commit_id BLOB NOT NULL,
            timestamp INTEGER NOT NULL,
            body BLOB NOT NULL,               -- canonical head encoding
            signature BLOB NOT NULL,          -- 64 bytes
            PRIMARY KEY (repo_key, commit_id)
        );

        -- Signed snapshots
        CREATE TABLE snapshots (
            repo_key INTEGER NOT NULL,
            commit_id BLOB NOT NULL,
            body BLOB NOT NULL,
            signature BLOB NOT NULL,
            PRIMARY KEY (repo_key, commit_id)
        );

        -- Signed pull requests, filed under the target repository owner
        CREATE TABLE pull_requests (
            owner BLOB NOT NULL,
            body BLOB NOT NULL,
            signature BLOB NOT NULL,
            received_at INTEGER NOT NULL,
            PRIMARY KEY (owner, body)
        );

        CREATE INDEX idx_commit_parents_parent ON commit_parents(repo_key, parent);
        CREATE INDEX idx_repos_owner ON repos(owner);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
