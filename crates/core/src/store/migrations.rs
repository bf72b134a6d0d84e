//! Schema for the `cache_entries` table.
//!
//! Every entity class shares one table keyed by `(class, entry_key)`, with
//! `written_at`/`expires_at` in Unix milliseconds and an index on
//! `(class, expires_at)` so sweeps touch only expired rows. Applied versions
//! are recorded in `_migrations`.

use tokio_rusqlite::{Connection, params};

use crate::Error;

/// Schema steps in version order. Each batch is idempotent.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_cache_entries.sql"))];

/// Bring the schema up to the latest version.
///
/// Each pending step runs in its own transaction together with its
/// `_migrations` row, so a failed step leaves the previous version intact.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().timestamp_millis()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied cache schema migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
