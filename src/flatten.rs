//! Lead-to-text flattening.
//!
//! Turns one raw lead record into a single natural-language paragraph
//! suitable for embedding. The clause order is fixed regardless of which
//! fields are present, so flattening the same record twice always yields
//! byte-identical text.

use crate::record::{format_date, LeadRecord};

#[derive(Clone, Copy)]
enum FieldKind {
    Text,
    Date,
}

/// Recognized fields in clause priority order. Absent or placeholder
/// fields are skipped entirely; the order never changes.
const PRIORITY_FIELDS: &[(&str, &str, FieldKind)] = &[
    ("enquiryDate", "Enquiry Date", FieldKind::Date),
    ("clientDetails.city", "City", FieldKind::Text),
    ("projectStage", "Project Stage", FieldKind::Text),
    ("clientDetails.name", "Client Name", FieldKind::Text),
    ("lastContactDate", "Last Contact Date", FieldKind::Date),
    ("lastDiscussion", "Last Discussion", FieldKind::Text),
    ("nextSteps", "Next Steps", FieldKind::Text),
    ("assignedTo", "Assigned To", FieldKind::Text),
    ("createdBy", "Created By", FieldKind::Text),
    ("concernPerson", "Contact Person", FieldKind::Text),
    ("status", "Status", FieldKind::Text),
    ("projectCategory", "Project Category", FieldKind::Text),
    ("clientDetails.phoneNumber", "Phone Number", FieldKind::Text),
    ("updatedAt", "Last Updated", FieldKind::Date),
    ("createdAt", "Created Date", FieldKind::Date),
];

/// Flatten a lead record into one paragraph.
///
/// Always begins with `"Lead from <tenant>."`; a record with nothing else
/// to say yields exactly that sentence. Free-text values are trimmed and
/// collapsed to single spaces so the result stays a single line with no
/// structural punctuation from the source mapping.
pub fn flatten(record: &LeadRecord, tenant: &str) -> String {
    let mut clauses = vec![format!("Lead from {}.", tenant)];

    for (path, label, kind) in PRIORITY_FIELDS {
        let Some(raw) = record.get_str(path) else {
            continue;
        };
        let rendered = match kind {
            FieldKind::Date => match format_date(&raw) {
                Some(d) => d,
                None => continue,
            },
            FieldKind::Text => collapse_whitespace(&raw),
        };
        if rendered.is_empty() {
            continue;
        }
        clauses.push(format!("{}: {}.", label, rendered));
    }

    clauses.join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> LeadRecord {
        LeadRecord::new(v)
    }

    #[test]
    fn empty_record_yields_opening_clause_only() {
        let text = flatten(&rec(json!({})), "Kalco");
        assert_eq!(text, "Lead from Kalco.");
    }

    #[test]
    fn all_placeholder_record_yields_opening_clause_only() {
        let text = flatten(
            &rec(json!({
                "enquiryDate": "N/A",
                "projectStage": "TBD",
                "clientDetails": { "city": "", "name": null }
            })),
            "Kalco",
        );
        assert_eq!(text, "Lead from Kalco.");
    }

    #[test]
    fn present_fields_render_absent_fields_skip() {
        let text = flatten(
            &rec(json!({
                "id": "L1",
                "enquiryDate": "2025-01-15",
                "clientDetails": { "city": "Mumbai" },
                "createdById": "u1"
            })),
            "Kalco",
        );
        assert!(text.starts_with("Lead from Kalco."), "got: {}", text);
        assert!(text.contains("Enquiry Date: January 15, 2025."), "got: {}", text);
        assert!(text.contains("City: Mumbai."), "got: {}", text);
        assert!(!text.contains("Project Stage"), "got: {}", text);
    }

    #[test]
    fn clause_order_ignores_source_field_order() {
        let a = rec(json!({
            "projectStage": "Design",
            "enquiryDate": "2025-01-15",
            "clientDetails": { "city": "Pune" }
        }));
        let b = rec(json!({
            "clientDetails": { "city": "Pune" },
            "projectStage": "Design",
            "enquiryDate": "2025-01-15"
        }));
        let text = flatten(&a, "Acme");
        assert_eq!(text, flatten(&b, "Acme"));

        let enquiry = text.find("Enquiry Date").unwrap();
        let city = text.find("City").unwrap();
        let stage = text.find("Project Stage").unwrap();
        assert!(enquiry < city && city < stage, "got: {}", text);
    }

    #[test]
    fn placeholders_never_appear_in_output() {
        let text = flatten(
            &rec(json!({
                "projectStage": "N/A",
                "status": "tbd",
                "lastDiscussion": "budget approved"
            })),
            "Acme",
        );
        assert!(!text.to_lowercase().contains("n/a"));
        assert!(!text.to_lowercase().contains("tbd"));
        assert!(text.contains("Last Discussion: budget approved."));
    }

    #[test]
    fn free_text_is_collapsed_to_one_line() {
        let text = flatten(
            &rec(json!({ "nextSteps": "  send quote\nthen follow up  " })),
            "Acme",
        );
        assert!(text.contains("Next Steps: send quote then follow up."));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn no_structural_punctuation_leaks() {
        let text = flatten(
            &rec(json!({
                "clientDetails": { "city": "Delhi" },
                "attachments": [ { "url": "x" } ]
            })),
            "Acme",
        );
        assert!(!text.contains('{') && !text.contains('}') && !text.contains('['));
    }

    #[test]
    fn flatten_is_idempotent() {
        let record = rec(json!({
            "enquiryDate": "2025-03-02",
            "lastDiscussion": "site visit done",
            "assignedTo": "Ravi"
        }));
        assert_eq!(flatten(&record, "Kalco"), flatten(&record, "Kalco"));
    }
}
