//! SQLite connection and schema for the sync-state ledger.
//!
//! The database is deliberately tiny: one table remembering what was last
//! upserted per (tenant, lead). The flattened documents themselves are
//! never stored here — the external vector store is the only durable home
//! for them.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the ledger schema. Idempotent; `leadlens init` and the start of
/// every sync both call it.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            tenant TEXT NOT NULL,
            lead_id TEXT NOT NULL,
            last_updated TEXT,
            content_hash TEXT NOT NULL,
            synced_at INTEGER NOT NULL,
            PRIMARY KEY (tenant, lead_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_state_tenant ON sync_state(tenant)")
        .execute(pool)
        .await?;

    Ok(())
}
