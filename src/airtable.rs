use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::http::RetryPolicy;
use crate::reconcile::{self, RecordCreate, RecordUpdate};
use crate::record::{Fields, Record};

const API_URL: &str = "https://api.airtable.com/v0";

/// Airtable rejects write payloads with more than 10 records.
const BATCH_SIZE: usize = 10;

const METRIC_NAME_FIELD: &str = "Metric";

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// The tabular remote store the KPI steps talk to. The production
/// implementation is [`AirtableClient`]; tests substitute an in-memory one.
pub trait RecordStore {
    /// Full table scan, pagination handled internally. Finite and restartable
    /// per call.
    fn list_records(
        &self,
        table: &str,
        fields: Option<&[&str]>,
        formula: Option<&str>,
    ) -> Result<Vec<Record>>;

    fn update_records(&self, table: &str, updates: &[RecordUpdate]) -> Result<()>;

    fn create_records(&self, table: &str, creates: &[RecordCreate]) -> Result<()>;

    fn update_single_record(&self, table: &str, record_id: &str, fields: Fields) -> Result<()>;

    /// First row whose metric-name column equals `metric`, or a lookup error.
    fn find_by_metric(&self, table: &str, metric: &str) -> Result<Record> {
        let formula = format!("{{{METRIC_NAME_FIELD}}} = '{metric}'");
        let records = self.list_records(table, None, Some(&formula))?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::MetricNotFound(metric.to_string(), table.to_string()))
    }

    /// Upsert keyed on a field value: scan the existing key column, partition
    /// desired rows into updates and creates, apply both in batches. Desired
    /// payloads are expected to already carry the key field.
    fn upsert_by_key(
        &self,
        table: &str,
        key_field: &str,
        desired: Vec<(String, Fields)>,
    ) -> Result<()> {
        let mut existing: HashMap<String, String> = HashMap::new();
        for record in self.list_records(table, Some(&[key_field]), None)? {
            let Some(value) = record.fields.get(key_field) else {
                continue;
            };
            let key = match value {
                Value::String(text) => text.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            if !key.is_empty() {
                existing.insert(key, record.id);
            }
        }

        let plan = reconcile::plan(desired, &existing, None);
        debug!(
            table,
            updates = plan.updates.len(),
            creates = plan.creates.len(),
            "applying upsert plan"
        );
        if !plan.updates.is_empty() {
            self.update_records(table, &plan.updates)?;
        }
        if !plan.creates.is_empty() {
            self.create_records(table, &plan.creates)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct AirtableClient {
    client: reqwest::blocking::Client,
    api_key: String,
    base_id: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

impl AirtableClient {
    pub fn new(api_key: &str, base_id: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_id: base_id.to_string(),
        })
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{API_URL}/{}/{table}", self.base_id);
        let policy = RetryPolicy::new("airtable");
        let response = policy.execute(|| {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.api_key);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send()
        })?;
        Ok(response.json()?)
    }
}

impl RecordStore for AirtableClient {
    fn list_records(
        &self,
        table: &str,
        fields: Option<&[&str]>,
        formula: Option<&str>,
    ) -> Result<Vec<Record>> {
        let mut base_query: Vec<(&str, String)> = Vec::new();
        if let Some(fields) = fields {
            for field in fields {
                base_query.push(("fields[]", (*field).to_string()));
            }
        }
        if let Some(formula) = formula {
            base_query.push(("filterByFormula", formula.to_string()));
        }

        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query = base_query.clone();
            if let Some(cursor) = &offset {
                query.push(("offset", cursor.clone()));
            }
            let payload = self.request(Method::GET, table, &query, None)?;
            let page: ListResponse = serde_json::from_value(payload)?;
            records.extend(page.records);
            offset = page.offset;
            if offset.is_none() {
                break;
            }
        }
        Ok(records)
    }

    fn update_records(&self, table: &str, updates: &[RecordUpdate]) -> Result<()> {
        for chunk in updates.chunks(BATCH_SIZE) {
            let body = json!({ "records": chunk });
            self.request(Method::PATCH, table, &[], Some(&body))?;
        }
        Ok(())
    }

    fn create_records(&self, table: &str, creates: &[RecordCreate]) -> Result<()> {
        for chunk in creates.chunks(BATCH_SIZE) {
            let body = json!({ "records": chunk });
            self.request(Method::POST, table, &[], Some(&body))?;
        }
        Ok(())
    }

    fn update_single_record(&self, table: &str, record_id: &str, fields: Fields) -> Result<()> {
        let body = json!({ "records": [{ "id": record_id, "fields": fields }] });
        self.request(Method::PATCH, table, &[], Some(&body))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::{record, MockStore};
    use super::*;

    #[test]
    fn test_find_by_metric_matches_and_errors() {
        let store = MockStore::default().with_table(
            "KPI",
            vec![
                record("rec1", json!({"Metric": "New orders"})),
                record("rec2", json!({"Metric": "Revenue (aed)"})),
            ],
        );
        let found = store.find_by_metric("KPI", "New orders").unwrap();
        assert_eq!(found.id, "rec1");
        let missing = store.find_by_metric("KPI", "CAC Converted (aed)");
        assert!(matches!(missing, Err(SyncError::MetricNotFound(_, _))));
    }

    #[test]
    fn test_upsert_by_key_partitions_rows() {
        let store = MockStore::default().with_table(
            "Spend",
            vec![record("rec1", json!({"id": "05/01/2025 - acct"}))],
        );
        let mut known = Fields::new();
        known.insert("id".to_string(), json!("05/01/2025 - acct"));
        known.insert("spend".to_string(), json!(120));
        let mut fresh = Fields::new();
        fresh.insert("id".to_string(), json!("05/02/2025 - acct"));
        fresh.insert("spend".to_string(), json!(80));

        store
            .upsert_by_key(
                "Spend",
                "id",
                vec![
                    ("05/01/2025 - acct".to_string(), known),
                    ("05/02/2025 - acct".to_string(), fresh),
                ],
            )
            .unwrap();

        let updates = store.updates.borrow();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1[0].id, "rec1");
        let creates = store.creates.borrow();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].1[0].fields["id"], json!("05/02/2025 - acct"));
    }
}
