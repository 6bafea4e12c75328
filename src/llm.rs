//! Chat-completion client for the question-answering path.
//!
//! The prompt is deliberately strict: the model answers only from the
//! retrieved lead snippets, so a tenant never gets an answer invented from
//! the model's general knowledge.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about a company's \
sales leads based on the provided context.\n\
- Answer the question based ONLY on the provided context.\n\
- If the information is not in the context, say \"I don't have information about that in the lead data.\"\n\
- Be specific and cite relevant details from the context.";

/// Answer a question grounded in the given context snippets.
pub async fn answer(config: &LlmConfig, question: &str, snippets: &[String]) -> Result<String> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let context = snippets.join("\n\n");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": config.model,
        "temperature": config.temperature,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": format!("Context:\n{}\n\nQuestion: {}", context, question) },
        ],
    });

    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(&api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("language model unreachable: {}", e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("language model error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    extract_answer(&json)
}

fn extract_answer(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing content"))
}
