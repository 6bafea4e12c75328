//! Loosely typed access to raw lead records.
//!
//! Lead records arrive as arbitrary JSON objects from the per-tenant
//! document store. Nothing about their shape can be assumed: any field may
//! be missing, null, or a placeholder string such as `"N/A"`. This module
//! is the only place that touches raw fields — everything downstream goes
//! through [`LeadRecord`] and gets back either a clean value or nothing.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Placeholder strings that count as "no value", compared case-insensitively
/// after trimming.
const PLACEHOLDERS: &[&str] = &["n/a", "na", "null", "none", "-", "tbd", "pending"];

/// One raw lead record as fetched from the document store.
#[derive(Debug, Clone)]
pub struct LeadRecord(Value);

impl LeadRecord {
    /// Wraps a JSON value. Non-object values are accepted and simply have
    /// no extractable fields.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Look up a dotted path (`"clientDetails.city"`). A missing parent is
    /// the same as a missing leaf. Placeholder values come back as `None`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.0;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        if is_empty_value(current) {
            None
        } else {
            Some(current)
        }
    }

    /// Like [`get`](Self::get), rendered as trimmed display text. Objects
    /// and arrays have no text rendering — structural punctuation must
    /// never leak into flattened output.
    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Object(_) | Value::Array(_) | Value::Null => None,
        }
    }

    /// The record identifier, checked under `id` then `leadId`.
    pub fn id(&self) -> Option<String> {
        self.get_str("id").or_else(|| self.get_str("leadId"))
    }

    /// The freshness timestamp, checked under `updatedAt` then `updated_at`.
    pub fn last_updated(&self) -> Option<String> {
        self.get_str("updatedAt")
            .or_else(|| self.get_str("updated_at"))
    }

}

/// True if the value is null, an empty string/array/object, or one of the
/// placeholder sentinels.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let stripped = s.trim().to_lowercase();
            stripped.is_empty() || PLACEHOLDERS.contains(&stripped.as_str())
        }
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Number(_) | Value::Bool(_) => false,
    }
}

/// Render a date-ish string as `"<Month name> <day>, <year>"`.
///
/// Accepts `YYYY-MM-DD`, `DD-MM-YYYY`, `MM/DD/YYYY`, and ISO-8601
/// datetimes with optional fractional seconds and trailing `Z`. Anything
/// unrecognized falls back to the trimmed input so a meaningful value is
/// never dropped on the floor.
pub fn format_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let stripped = trimmed.trim_end_matches('Z');

    if let Ok(dt) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.format("%B %-d, %Y").to_string());
    }

    for fmt in ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(stripped, fmt) {
            return Some(d.format("%B %-d, %Y").to_string());
        }
    }

    Some(trimmed.to_string())
}
