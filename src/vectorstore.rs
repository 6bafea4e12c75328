//! Vector store client.
//!
//! Each tenant gets its own index, named `<tenant-lowercase>-leads`.
//! Upserts are batched and wrapped in an explicit [`RetryPolicy`]; the
//! store is keyed by document id, so re-sending a batch after a partial
//! failure is safe (at-least-once upsert semantics).

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::process::DocumentMetadata;

/// Bounded exponential backoff, independent of what it wraps.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &VectorStoreConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Delay before retry number `attempt` (1-based): base × 2^(attempt-1),
    /// exponent capped at 2^5, plus up to 50% jitter when enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = (attempt.saturating_sub(1)).min(5);
        let base = self.base_delay.saturating_mul(1 << exp);
        if self.jitter {
            let extra_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
            base + Duration::from_millis(extra_ms)
        } else {
            base
        }
    }
}

/// One vector ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: DocumentMetadata,
    /// Flattened paragraph; stored in the index payload so queries can
    /// return a snippet without a second lookup.
    pub text: String,
}

/// One ranked query hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Value,
    pub snippet: String,
}

/// The index name for a tenant.
pub fn index_name(tenant: &str) -> String {
    format!("{}-leads", tenant.to_lowercase())
}

pub struct VectorStoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    pub upsert_batch_size: usize,
    pub top_k: usize,
    policy: RetryPolicy,
}

impl VectorStoreClient {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            upsert_batch_size: config.upsert_batch_size,
            top_k: config.top_k,
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Upsert one batch of points, retrying under the policy. Returns the
    /// number of points the store acknowledged.
    pub async fn upsert_batch(&self, tenant: &str, batch: &[VectorPoint]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/{}/vectors/upsert", self.base_url, index_name(tenant));
        let vectors: Vec<Value> = batch
            .iter()
            .map(|p| {
                let mut metadata = serde_json::to_value(&p.metadata).unwrap_or(Value::Null);
                if let Value::Object(ref mut map) = metadata {
                    map.insert("text".to_string(), Value::String(p.text.clone()));
                }
                serde_json::json!({
                    "id": p.id,
                    "values": p.values,
                    "metadata": metadata,
                })
            })
            .collect();
        let body = serde_json::json!({ "vectors": vectors });

        let json = self.send_with_retry(&url, &body).await?;
        let acknowledged = json
            .get("upsertedCount")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(batch.len());
        Ok(acknowledged)
    }

    /// Query a tenant's index by vector, returning ranked matches.
    pub async fn query(
        &self,
        tenant: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let url = format!("{}/{}/query", self.base_url, index_name(tenant));
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });

        let json = self.send_with_retry(&url, &body).await?;
        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid query response: missing matches array"))?;

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let id = m
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let metadata = m.get("metadata").cloned().unwrap_or(Value::Null);
            let snippet = snippet_from_metadata(&metadata);
            results.push(VectorMatch {
                id,
                score,
                metadata,
                snippet,
            });
        }
        Ok(results)
    }

    /// POST with the retry policy: 429/5xx and network errors retry,
    /// other 4xx fail immediately.
    async fn send_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }

            let mut request = self.client.post(url).json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Api-Key", key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .context("Invalid JSON from vector store");
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "vector store error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("vector store error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("vector store unreachable: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            anyhow::anyhow!(
                "vector store request failed after {} attempts",
                self.policy.max_attempts
            )
        }))
    }
}

fn snippet_from_metadata(metadata: &Value) -> String {
    let text = metadata
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let mut snippet: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        snippet.push('…');
    }
    snippet
}
