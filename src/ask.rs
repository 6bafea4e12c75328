//! Question answering over synced lead data.
//!
//! Retrieval-augmented: embed the question, pull the closest lead
//! paragraphs from the tenant's index, and hand those snippets to the
//! language model as the only context it may answer from.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::docstore;
use crate::embedding;
use crate::llm;
use crate::vectorstore::{VectorMatch, VectorStoreClient};

/// Answer returned when retrieval produces no matches. The model is not
/// consulted in that case.
pub const NO_DATA_ANSWER: &str =
    "No matching lead data found. Run a sync for this tenant and try again.";

/// An answer plus the retrieved leads it was grounded on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<VectorMatch>,
}

/// Answer a question against a tenant's synced leads.
pub async fn run_ask(config: &Config, tenant: &str, question: &str) -> Result<Answer> {
    if tenant.trim().is_empty() {
        bail!("tenantName must not be empty");
    }
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    // Same precedence as sync: an unknown tenant is a configuration
    // error, not an upstream one.
    docstore::load_credentials(config, tenant)?;

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let vector = embedding::embed_query(&config.embedding, question).await?;
    let vectorstore = VectorStoreClient::new(&config.vectorstore)?;
    let matches = vectorstore
        .query(tenant, &vector, vectorstore.top_k)
        .await?;

    if matches.is_empty() {
        return Ok(Answer {
            answer: NO_DATA_ANSWER.to_string(),
            sources: Vec::new(),
        });
    }

    let snippets: Vec<String> = matches.iter().map(|m| m.snippet.clone()).collect();
    let answer = llm::answer(&config.llm, question, &snippets).await?;

    Ok(Answer {
        answer,
        sources: matches,
    })
}
