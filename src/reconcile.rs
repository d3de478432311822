use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::record::Fields;

#[derive(Debug, Clone, Serialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordCreate {
    pub fields: Fields,
}

/// Update/create partition for one sync. Built, applied, discarded; never
/// persisted.
#[derive(Debug, Default)]
pub struct ReconciliationPlan {
    pub updates: Vec<RecordUpdate>,
    pub creates: Vec<RecordCreate>,
}

/// Partition desired rows against an existing key -> record-id index. Keys
/// with a match become updates, the rest become creates; output order follows
/// the iteration order of `desired`. When `create_key_field` is given, create
/// payloads that do not already carry that field get the key written into it
/// so the row can be matched on the next run.
pub fn plan<I>(
    desired: I,
    existing: &HashMap<String, String>,
    create_key_field: Option<&str>,
) -> ReconciliationPlan
where
    I: IntoIterator<Item = (String, Fields)>,
{
    let mut result = ReconciliationPlan::default();
    for (key, mut fields) in desired {
        match existing.get(&key) {
            Some(id) => result.updates.push(RecordUpdate {
                id: id.clone(),
                fields,
            }),
            None => {
                if let Some(key_field) = create_key_field {
                    fields
                        .entry(key_field.to_string())
                        .or_insert_with(|| Value::String(key.clone()));
                }
                result.creates.push(RecordCreate { fields });
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_matched_key_is_exactly_one_update() {
        let existing = HashMap::from([("Tea".to_string(), "rec1".to_string())]);
        let desired = vec![("Tea".to_string(), payload(json!({"April": 3})))];
        let plan = plan(desired, &existing, Some("Category"));
        assert_eq!(plan.updates.len(), 1);
        assert!(plan.creates.is_empty());
        assert_eq!(plan.updates[0].id, "rec1");
        // Updates never get the key field injected.
        assert!(!plan.updates[0].fields.contains_key("Category"));
    }

    #[test]
    fn test_unmatched_key_is_exactly_one_create_with_key_field() {
        let existing = HashMap::new();
        let desired = vec![("Coffee".to_string(), payload(json!({"April": 1})))];
        let plan = plan(desired, &existing, Some("Category"));
        assert!(plan.updates.is_empty());
        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].fields["Category"], json!("Coffee"));
    }

    #[test]
    fn test_order_follows_caller_iteration() {
        let existing = HashMap::from([
            ("b".to_string(), "rec-b".to_string()),
            ("d".to_string(), "rec-d".to_string()),
        ]);
        let desired = ["c", "b", "a", "d"]
            .into_iter()
            .map(|key| (key.to_string(), Fields::new()));
        let plan = plan(desired, &existing, None);
        let update_ids: Vec<&str> = plan.updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(update_ids, vec!["rec-b", "rec-d"]);
        assert_eq!(plan.creates.len(), 2);
    }

    #[test]
    fn test_existing_key_field_is_not_overwritten() {
        let desired = vec![(
            "05/01/2025 - acct".to_string(),
            payload(json!({"id": "05/01/2025 - acct", "spend": 120})),
        )];
        let plan = plan(desired, &HashMap::new(), Some("id"));
        assert_eq!(plan.creates[0].fields["id"], json!("05/01/2025 - acct"));
    }
}
