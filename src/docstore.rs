//! Per-tenant document store clients.
//!
//! Each tenant registers a credential file `<credentials_dir>/<tenant>.json`
//! describing where its lead records live. A missing file is a
//! configuration error surfaced immediately — never retried, never treated
//! as "zero leads".
//!
//! Two backends:
//! - **`rest`** — a JSON-over-HTTP document database exposing the tenant's
//!   `leads` collection behind bearer auth.
//! - **`file`** — a local JSON array of records. Used for demos and tests,
//!   and the offline analogue of the hosted store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::record::LeadRecord;

/// Marker included in the credential-lookup error message; the server maps
/// it to the `configuration_missing` error code.
pub const ERR_NO_CREDENTIALS: &str = "no credentials registered for tenant";

/// A tenant's credential file.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantCredentials {
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub leads_path: Option<PathBuf>,
}

/// Source of raw lead records for one tenant.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the full current set of lead records. No pagination contract;
    /// the backing store returns everything for the tenant.
    async fn fetch_all(&self, tenant: &str) -> Result<Vec<LeadRecord>>;
}

fn credentials_path(config: &Config, tenant: &str) -> PathBuf {
    config
        .tenants
        .credentials_dir
        .join(format!("{}.json", tenant))
}

/// Load and parse the credential file for a tenant.
pub fn load_credentials(config: &Config, tenant: &str) -> Result<TenantCredentials> {
    let path = credentials_path(config, tenant);
    if !path.exists() {
        bail!(
            "{} '{}'. Expected file: {}",
            ERR_NO_CREDENTIALS,
            tenant,
            path.display()
        );
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read credentials: {}", path.display()))?;
    let creds: TenantCredentials = serde_json::from_str(&content)
        .with_context(|| format!("Invalid credentials file: {}", path.display()))?;
    Ok(creds)
}

/// True when the credential file has everything its provider needs.
pub fn credentials_usable(creds: &TenantCredentials) -> bool {
    match creds.provider.as_str() {
        "rest" => creds.base_url.is_some() && creds.api_key.is_some(),
        "file" => creds.leads_path.is_some(),
        _ => false,
    }
}

/// Open the document store described by a tenant's credentials.
pub fn open_store(config: &Config, tenant: &str) -> Result<Box<dyn DocumentStore>> {
    let creds = load_credentials(config, tenant)?;
    match creds.provider.as_str() {
        "rest" => {
            let base_url = creds
                .base_url
                .ok_or_else(|| anyhow::anyhow!("rest credentials require base_url"))?;
            let api_key = creds
                .api_key
                .ok_or_else(|| anyhow::anyhow!("rest credentials require api_key"))?;
            Ok(Box::new(RestDocumentStore::new(base_url, api_key)?))
        }
        "file" => {
            let path = creds
                .leads_path
                .ok_or_else(|| anyhow::anyhow!("file credentials require leads_path"))?;
            // Relative paths resolve against the credentials directory
            let path = if path.is_absolute() {
                path
            } else {
                config.tenants.credentials_dir.join(path)
            };
            Ok(Box::new(FileDocumentStore { path }))
        }
        other => bail!(
            "Unknown document store provider '{}' for tenant '{}'. Must be rest or file.",
            other,
            tenant
        ),
    }
}

/// Tenants with a credential file, with a usability flag, sorted by name.
pub fn list_tenants(config: &Config) -> Result<Vec<(String, bool)>> {
    let dir = &config.tenants.credentials_dir;
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tenants = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let usable = load_credentials(config, name)
            .map(|c| credentials_usable(&c))
            .unwrap_or(false);
        tenants.push((name.to_string(), usable));
    }
    tenants.sort();
    Ok(tenants)
}

// ============ REST store ============

/// Hosted document database speaking JSON over HTTP.
pub struct RestDocumentStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestDocumentStore {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn fetch_all(&self, tenant: &str) -> Result<Vec<LeadRecord>> {
        let url = format!("{}/leads", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("document store unreachable for tenant '{}'", tenant))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("document store error {} for tenant '{}': {}", status, tenant, body);
        }

        let json: Value = response.json().await?;
        parse_lead_payload(json)
    }
}

// ============ File store ============

/// Local JSON file holding an array of lead records.
pub struct FileDocumentStore {
    pub path: PathBuf,
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn fetch_all(&self, tenant: &str) -> Result<Vec<LeadRecord>> {
        if !self.path.exists() {
            bail!(
                "leads file for tenant '{}' does not exist: {}",
                tenant,
                self.path.display()
            );
        }
        let content = std::fs::read_to_string(&self.path)?;
        let json: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid leads file: {}", self.path.display()))?;
        parse_lead_payload(json)
    }
}

/// Accept either a bare array or `{"leads": [...]}`.
fn parse_lead_payload(json: Value) -> Result<Vec<LeadRecord>> {
    let items = match json {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("leads") {
            Some(Value::Array(items)) => items,
            _ => bail!("lead payload must be an array or an object with a 'leads' array"),
        },
        _ => bail!("lead payload must be an array or an object with a 'leads' array"),
    };
    Ok(items.into_iter().map(LeadRecord::new).collect())
}
