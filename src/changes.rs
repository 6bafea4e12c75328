//! Change detection and the per-tenant sync-state ledger.
//!
//! The ledger records, for every lead that was successfully upserted, the
//! freshness timestamp the record carried and a hash of the flattened text.
//! On the next run a lead is re-sent only when it looks newer than what was
//! stored, its text hash changed, or a force refresh was requested. When a
//! timestamp cannot be parsed the comparison fails open — re-processing is
//! cheap, silently skipping is not.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// What the ledger remembers about one previously synced lead.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub last_updated: Option<String>,
    pub content_hash: String,
}

/// Decide whether a lead must be (re-)embedded and upserted.
///
/// True when `force` is set, when no previous state exists (first-time
/// sync), when the flattened text hash differs from the stored one, or when
/// the record's timestamp is strictly newer. Unparseable timestamps on
/// either side mean "needs sync".
pub fn needs_sync(
    last_updated: Option<&str>,
    content_hash: &str,
    previous: Option<&SyncState>,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    let Some(prev) = previous else {
        return true;
    };
    if prev.content_hash != content_hash {
        return true;
    }
    match (
        last_updated.and_then(parse_timestamp),
        prev.last_updated.as_deref().and_then(parse_timestamp),
    ) {
        (Some(current), Some(stored)) => current > stored,
        _ => true,
    }
}

/// Hash of the flattened text, used alongside the timestamp comparison.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parse an ISO-8601-ish timestamp into a comparable instant.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    let stripped = trimmed.trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(stripped, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Load the whole ledger for one tenant, keyed by lead id.
pub async fn load_state(pool: &SqlitePool, tenant: &str) -> Result<HashMap<String, SyncState>> {
    let rows = sqlx::query(
        "SELECT lead_id, last_updated, content_hash FROM sync_state WHERE tenant = ?",
    )
    .bind(tenant)
    .fetch_all(pool)
    .await?;

    let mut state = HashMap::with_capacity(rows.len());
    for row in rows {
        let lead_id: String = row.get("lead_id");
        state.insert(
            lead_id,
            SyncState {
                last_updated: row.get("last_updated"),
                content_hash: row.get("content_hash"),
            },
        );
    }
    Ok(state)
}

/// Record a successful upsert for one lead.
pub async fn record_synced(
    pool: &SqlitePool,
    tenant: &str,
    lead_id: &str,
    last_updated: Option<&str>,
    content_hash: &str,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO sync_state (tenant, lead_id, last_updated, content_hash, synced_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant, lead_id) DO UPDATE SET
            last_updated = excluded.last_updated,
            content_hash = excluded.content_hash,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(tenant)
    .bind(lead_id)
    .bind(last_updated)
    .bind(content_hash)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
