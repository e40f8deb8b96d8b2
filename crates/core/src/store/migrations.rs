//! Store schema migrations.
//!
//! Applied versions are recorded in `_migrations`; on open, every listed
//! migration above the recorded maximum runs once, in order.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// Schema versions and their SQL, ascending.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_stores.sql"))];

/// Apply pending migrations.
///
/// # Errors
///
/// `STORE_IO: migration failed` when a migration batch does not apply.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let applied: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
            .map_err(Error::from)?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > applied) {
            let tx = conn.transaction().map_err(Error::from)?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(Error::from)?;
            tx.commit().map_err(Error::from)?;
            tracing::debug!(version, "applied store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
