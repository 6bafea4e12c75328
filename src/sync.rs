//! Sync orchestration.
//!
//! One sync run walks fetch → filter → change-detect → flatten → embed →
//! upsert and reports what happened as counts. Failures stay local: a
//! batch that exhausts its retries is counted as failed and the run keeps
//! going, so a flaky upstream never wipes out the rest of a tenant's sync.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

use crate::changes;
use crate::config::Config;
use crate::db;
use crate::docstore;
use crate::embedding;
use crate::process::{self, FlatDocument};
use crate::record::LeadRecord;
use crate::vectorstore::{VectorPoint, VectorStoreClient};

/// Caller-supplied knobs for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Keep only records assigned to this name.
    pub assigned_to: Option<String>,
    /// Keep only records assigned to this user id.
    pub assigned_to_id: Option<String>,
    /// Re-embed everything regardless of change detection.
    pub force_refresh: bool,
    /// Stop after change detection; print what would happen.
    pub dry_run: bool,
}

/// Outcome counts for one sync run.
///
/// `skipped` (change detection said no update needed) and `filtered_out`
/// (assignee mismatch) have different causes and are kept distinct here;
/// the HTTP layer folds them into one public `skippedCount`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub filtered_out: usize,
    pub failed: usize,
}

impl SyncReport {
    /// The externally reported skipped figure.
    pub fn skipped_total(&self) -> usize {
        self.skipped + self.filtered_out
    }
}

/// Run one sync for a tenant.
pub async fn run_sync(config: &Config, tenant: &str, opts: &SyncOptions) -> Result<SyncReport> {
    if tenant.trim().is_empty() {
        bail!("tenantName must not be empty");
    }

    // Credential resolution happens before any external call; a missing
    // tenant surfaces immediately.
    let store = docstore::open_store(config, tenant)?;

    let pool = db::connect(config).await?;
    db::ensure_schema(&pool).await?;

    let mut report = SyncReport::default();
    let started = Instant::now();
    let deadline = match config.sync.deadline_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let records = store.fetch_all(tenant).await?;
    report.fetched = records.len();

    // Assignee filtering, before change detection: excluded records are
    // not considered at all.
    let retained: Vec<LeadRecord> = records
        .into_iter()
        .filter(|r| {
            let keep = matches_assignee(r, opts);
            if !keep {
                report.filtered_out += 1;
            }
            keep
        })
        .collect();

    let (documents, missing_id) = process::build_documents(&retained, tenant);
    if missing_id > 0 {
        eprintln!(
            "Warning: {} record(s) without an id for tenant '{}' cannot be upserted; counted as failed",
            missing_id, tenant
        );
        report.failed += missing_id;
    }

    let previous = changes::load_state(&pool, tenant).await?;

    let mut pending: Vec<(FlatDocument, String)> = Vec::new();
    for doc in documents {
        let hash = changes::content_hash(&doc.text);
        let last_updated = match doc.metadata.updated_at.as_str() {
            "" => None,
            s => Some(s),
        };
        if changes::needs_sync(last_updated, &hash, previous.get(&doc.id), opts.force_refresh) {
            pending.push((doc, hash));
        } else {
            report.skipped += 1;
        }
    }

    let summary = process::summarize(
        &pending.iter().map(|(d, _)| d.clone()).collect::<Vec<_>>(),
    );

    if opts.dry_run {
        println!("sync {} (dry-run)", tenant);
        println!("  fetched: {}", report.fetched);
        println!("  filtered out: {}", report.filtered_out);
        println!("  would upsert: {}", pending.len());
        println!("  skipped (unchanged): {}", report.skipped);
        println!("  groups: {}", summary.leads_by_group.len());
        pool.close().await;
        return Ok(report);
    }

    if !config.embedding.is_enabled() && !pending.is_empty() {
        pool.close().await;
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let vectorstore = VectorStoreClient::new(&config.vectorstore)?;

    let mut remaining = pending.as_slice();
    while !remaining.is_empty() {
        // Past the deadline we stop issuing new batches; anything left is
        // reported, not silently dropped.
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                eprintln!(
                    "Warning: sync deadline exceeded for '{}'; {} record(s) not attempted",
                    tenant,
                    remaining.len()
                );
                report.failed += remaining.len();
                break;
            }
        }

        let take = remaining.len().min(config.embedding.batch_size);
        let (batch, rest) = remaining.split_at(take);
        remaining = rest;

        let texts: Vec<String> = batch.iter().map(|(d, _)| d.text.clone()).collect();
        let vectors = match embedding::embed_texts(&config.embedding, &texts).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                report.failed += batch.len();
                continue;
            }
        };

        let points: Vec<(VectorPoint, &str, Option<String>)> = batch
            .iter()
            .zip(vectors)
            .map(|((doc, hash), values)| {
                let last_updated = match doc.metadata.updated_at.as_str() {
                    "" => None,
                    s => Some(s.to_string()),
                };
                (
                    VectorPoint {
                        id: doc.id.clone(),
                        values,
                        metadata: doc.metadata.clone(),
                        text: doc.text.clone(),
                    },
                    hash.as_str(),
                    last_updated,
                )
            })
            .collect();

        for chunk in points.chunks(vectorstore.upsert_batch_size) {
            let batch_points: Vec<VectorPoint> = chunk.iter().map(|(p, _, _)| p.clone()).collect();
            match vectorstore.upsert_batch(tenant, &batch_points).await {
                Ok(acknowledged) => {
                    for (point, hash, last_updated) in chunk {
                        changes::record_synced(
                            &pool,
                            tenant,
                            &point.id,
                            last_updated.as_deref(),
                            hash,
                        )
                        .await?;
                    }
                    // The store reports how many points it actually took.
                    report.upserted += acknowledged.min(chunk.len());
                }
                Err(e) => {
                    eprintln!("Warning: upsert batch failed: {}", e);
                    report.failed += chunk.len();
                }
            }
        }
    }

    println!("sync {}", tenant);
    println!("  fetched: {}", report.fetched);
    println!("  filtered out: {}", report.filtered_out);
    println!("  upserted: {}", report.upserted);
    println!("  skipped (unchanged): {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("  groups: {}", summary.leads_by_group.len());
    println!("ok");

    pool.close().await;
    Ok(report)
}

fn matches_assignee(record: &LeadRecord, opts: &SyncOptions) -> bool {
    if let Some(name) = &opts.assigned_to {
        if record.get_str("assignedTo").as_deref() != Some(name.as_str()) {
            return false;
        }
    }
    if let Some(id) = &opts.assigned_to_id {
        if record.get_str("assignedToId").as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    true
}

/// One async mutex per tenant: two concurrent syncs for the same tenant
/// serialize, different tenants stay independent.
#[derive(Clone, Default)]
pub struct TenantLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                // The map holds only Arc handles; a poisoned lock is still usable.
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(tenant.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
