//! Flattened document assembly and aggregate reporting.
//!
//! A [`FlatDocument`] is the unit handed to the embedding + vector-store
//! pipeline: the lead id, its flattened paragraph, and the metadata the
//! vector store keeps alongside the vector. The grouping key lives here so
//! the metadata and the summary can never disagree about its format.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::flatten::flatten;
use crate::record::LeadRecord;

/// Fallback creator id when the record carries none.
pub const UNKNOWN_CREATOR: &str = "unknown";
/// Fallback assignee id when the record carries none.
pub const UNASSIGNED: &str = "unassigned";

/// Metadata stored with each vector, mirroring what the query path gets
/// back from the vector store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub company: String,
    pub lead_id: String,
    pub created_by_id: String,
    pub created_by: String,
    pub assigned_to_id: String,
    pub assigned_to: String,
    pub city: String,
    pub updated_at: String,
    pub grouping_key: String,
}

/// One lead, flattened and ready for embedding.
#[derive(Debug, Clone, Serialize)]
pub struct FlatDocument {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// The composite creator/assignee key used for aggregate reporting.
///
/// Computed in exactly one place; document metadata and the summary both
/// go through this function.
pub fn grouping_key(created_by_id: &str, assigned_to_id: &str) -> String {
    format!("created:{}|assigned:{}", created_by_id, assigned_to_id)
}

/// Build a flattened document from one record, or `None` when the record
/// has no identifier to address it by in the vector store.
pub fn build_document(record: &LeadRecord, tenant: &str) -> Option<FlatDocument> {
    let id = record.id()?;

    let created_by_id = record
        .get_str("createdById")
        .unwrap_or_else(|| UNKNOWN_CREATOR.to_string());
    let assigned_to_id = record
        .get_str("assignedToId")
        .unwrap_or_else(|| UNASSIGNED.to_string());

    let city = record
        .get_str("clientDetails.city")
        .or_else(|| record.get_str("city"))
        .unwrap_or_default();

    Some(FlatDocument {
        id: id.clone(),
        text: flatten(record, tenant),
        metadata: DocumentMetadata {
            company: tenant.to_string(),
            lead_id: id,
            grouping_key: grouping_key(&created_by_id, &assigned_to_id),
            created_by: record.get_str("createdBy").unwrap_or_default(),
            assigned_to: record.get_str("assignedTo").unwrap_or_default(),
            created_by_id,
            assigned_to_id,
            city,
            updated_at: record.last_updated().unwrap_or_default(),
        },
    })
}

/// Build documents for a batch of records. Duplicate ids collapse
/// last-write-wins, keeping first-seen position. Records without an id are
/// dropped and counted.
pub fn build_documents(records: &[LeadRecord], tenant: &str) -> (Vec<FlatDocument>, usize) {
    let mut docs: Vec<FlatDocument> = Vec::with_capacity(records.len());
    let mut index_by_id: BTreeMap<String, usize> = BTreeMap::new();
    let mut missing_id = 0usize;

    for record in records {
        let Some(doc) = build_document(record, tenant) else {
            missing_id += 1;
            continue;
        };
        match index_by_id.get(&doc.id) {
            Some(&i) => docs[i] = doc,
            None => {
                index_by_id.insert(doc.id.clone(), docs.len());
                docs.push(doc);
            }
        }
    }

    (docs, missing_id)
}

/// Aggregate counts over one run's documents. Recomputed per request,
/// never persisted.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessingSummary {
    pub total_leads: usize,
    pub leads_by_creator: BTreeMap<String, usize>,
    pub leads_by_assignee: BTreeMap<String, usize>,
    pub leads_by_group: BTreeMap<String, usize>,
    pub creators: Vec<String>,
    pub assignees: Vec<String>,
    pub grouping_keys: Vec<String>,
}

/// One pass over the documents: totals, per-creator / per-assignee /
/// per-group counts, and sorted distinct id lists.
pub fn summarize(documents: &[FlatDocument]) -> ProcessingSummary {
    let mut summary = ProcessingSummary {
        total_leads: documents.len(),
        ..Default::default()
    };

    for doc in documents {
        *summary
            .leads_by_creator
            .entry(doc.metadata.created_by_id.clone())
            .or_default() += 1;
        *summary
            .leads_by_assignee
            .entry(doc.metadata.assigned_to_id.clone())
            .or_default() += 1;
        *summary
            .leads_by_group
            .entry(doc.metadata.grouping_key.clone())
            .or_default() += 1;
    }

    summary.creators = summary.leads_by_creator.keys().cloned().collect();
    summary.assignees = summary.leads_by_assignee.keys().cloned().collect();
    summary.grouping_keys = summary.leads_by_group.keys().cloned().collect();

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> LeadRecord {
        LeadRecord::new(v)
    }

    #[test]
    fn grouping_key_format_and_fallbacks() {
        assert_eq!(grouping_key("u1", "u2"), "created:u1|assigned:u2");

        let doc = build_document(&rec(json!({ "id": "L1", "createdById": "u1" })), "Acme").unwrap();
        assert_eq!(doc.metadata.grouping_key, "created:u1|assigned:unassigned");

        let doc = build_document(&rec(json!({ "id": "L2" })), "Acme").unwrap();
        assert_eq!(
            doc.metadata.grouping_key,
            "created:unknown|assigned:unassigned"
        );
    }

    #[test]
    fn metadata_key_matches_summary_key() {
        let doc = build_document(
            &rec(json!({ "id": "L1", "createdById": "u1", "assignedToId": "u2" })),
            "Acme",
        )
        .unwrap();
        let summary = summarize(std::slice::from_ref(&doc));
        assert_eq!(summary.grouping_keys, vec![doc.metadata.grouping_key]);
    }

    #[test]
    fn city_falls_back_to_top_level() {
        let doc = build_document(&rec(json!({ "id": "L1", "city": "Surat" })), "Acme").unwrap();
        assert_eq!(doc.metadata.city, "Surat");

        let doc = build_document(
            &rec(json!({ "id": "L2", "clientDetails": { "city": "Nashik" }, "city": "Surat" })),
            "Acme",
        )
        .unwrap();
        assert_eq!(doc.metadata.city, "Nashik");
    }

    #[test]
    fn duplicate_ids_collapse_last_write_wins() {
        let records = vec![
            rec(json!({ "id": "L1", "projectStage": "Design" })),
            rec(json!({ "id": "L2" })),
            rec(json!({ "id": "L1", "projectStage": "Handover" })),
        ];
        let (docs, missing) = build_documents(&records, "Acme");
        assert_eq!(missing, 0);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "L1");
        assert!(docs[0].text.contains("Handover"), "got: {}", docs[0].text);
    }

    #[test]
    fn records_without_id_are_counted() {
        let records = vec![rec(json!({ "projectStage": "Design" })), rec(json!({ "id": "L1" }))];
        let (docs, missing) = build_documents(&records, "Acme");
        assert_eq!(docs.len(), 1);
        assert_eq!(missing, 1);
    }

    #[test]
    fn summary_counts_sum_to_total() {
        let records: Vec<LeadRecord> = (0..7)
            .map(|i| {
                rec(json!({
                    "id": format!("L{}", i),
                    "createdById": format!("u{}", i % 2),
                    "assignedToId": if i % 3 == 0 { json!(null) } else { json!(format!("a{}", i % 3)) }
                }))
            })
            .collect();
        let (docs, _) = build_documents(&records, "Acme");
        let summary = summarize(&docs);

        assert_eq!(summary.total_leads, 7);
        assert_eq!(summary.leads_by_creator.values().sum::<usize>(), 7);
        assert_eq!(summary.leads_by_assignee.values().sum::<usize>(), 7);
        assert_eq!(summary.leads_by_group.values().sum::<usize>(), 7);
        assert!(summary.assignees.contains(&UNASSIGNED.to_string()));

        // Distinct lists are sorted and deduplicated
        let mut sorted = summary.creators.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(summary.creators, sorted);
    }
}
