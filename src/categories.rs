use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::info;

use crate::airtable::RecordStore;
use crate::dates::to_business_date;
use crate::error::Result;
use crate::kpi::{STATUS_EXPECTED, STATUS_FIELD};
use crate::record::{extract_categories, normalize_enum_text, FieldSpec, Fields};
use crate::reconcile;
use crate::windows::MonthlyWindows;

const ORDER_DATE_FIELD: FieldSpec = FieldSpec::new("Order Date", &["date", "Date"]);
const CATEGORY_SOURCE_FIELD: FieldSpec = FieldSpec::new("Category (from Product)", &["Category"]);

/// Name column of the category KPI table; also the key creates are written
/// under.
const CATEGORY_NAME_FIELD: &str = "Category";

#[derive(Debug)]
pub struct CategorySyncOutcome {
    pub updates: usize,
    pub creates: usize,
    /// All categories in final rank order.
    pub categories: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct WindowCounts {
    previous: u64,
    current: u64,
}

/// Count captured orders per category per window and reconcile the category
/// KPI table: existing rows get their two month columns rewritten, new
/// categories get created. Categories that stopped appearing are reset to 0
/// but never deleted.
///
/// Rows are written in rank order: descending current count, descending
/// previous count, then case-insensitive name. The tiebreak chain is total,
/// so ranks are stable across runs.
pub fn update_category_monthly_counts(
    store: &dyn RecordStore,
    orders_table: &str,
    category_table: &str,
    windows: &MonthlyWindows,
) -> Result<CategorySyncOutcome> {
    let previous = windows.previous;
    let current = windows.current;
    let label_previous = previous.label();
    let label_current = current.label();

    let mut counts: HashMap<String, WindowCounts> = HashMap::new();
    for record in store.list_records(orders_table, None, None)? {
        let fields = &record.fields;
        if normalize_enum_text(STATUS_FIELD.resolve(fields)) != STATUS_EXPECTED {
            continue;
        }
        let Some(order_date) = ORDER_DATE_FIELD.resolve(fields).and_then(to_business_date) else {
            continue;
        };
        if order_date < previous.start || order_date > current.end {
            continue;
        }
        let categories = extract_categories(CATEGORY_SOURCE_FIELD.resolve(fields));
        if categories.is_empty() {
            continue;
        }
        let in_previous = previous.contains(order_date);
        let in_current = current.contains(order_date);
        if !in_previous && !in_current {
            continue;
        }
        // An order with several categories increments each of them.
        for category in categories {
            let entry = counts.entry(category).or_default();
            if in_previous {
                entry.previous += 1;
            }
            if in_current {
                entry.current += 1;
            }
        }
    }

    let mut existing: HashMap<String, String> = HashMap::new();
    for record in store.list_records(category_table, None, None)? {
        let name = match record.fields.get(CATEGORY_NAME_FIELD) {
            Some(Value::String(name)) => name.as_str(),
            Some(Value::Array(items)) => match items.first() {
                Some(Value::String(name)) => name.as_str(),
                _ => continue,
            },
            _ => continue,
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        existing.insert(name.to_string(), record.id.clone());
    }

    let mut names: BTreeSet<String> = counts.keys().cloned().collect();
    names.extend(existing.keys().cloned());

    let totals = |category: &str| -> (u64, u64) {
        counts
            .get(category)
            .map(|c| (c.current, c.previous))
            .unwrap_or((0, 0))
    };

    let mut ranked: Vec<String> = names.into_iter().collect();
    ranked.sort_by(|a, b| {
        let (a_current, a_previous) = totals(a);
        let (b_current, b_previous) = totals(b);
        b_current
            .cmp(&a_current)
            .then(b_previous.cmp(&a_previous))
            .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
    });

    let desired = ranked.iter().map(|category| {
        let (current_total, previous_total) = totals(category);
        let mut fields = Fields::new();
        fields.insert(label_previous.clone(), Value::from(previous_total));
        fields.insert(label_current.clone(), Value::from(current_total));
        (category.clone(), fields)
    });
    let plan = reconcile::plan(desired, &existing, Some(CATEGORY_NAME_FIELD));

    let outcome = CategorySyncOutcome {
        updates: plan.updates.len(),
        creates: plan.creates.len(),
        categories: ranked,
    };
    info!(
        updates = outcome.updates,
        creates = outcome.creates,
        table = category_table,
        "category KPI refresh"
    );
    if !plan.updates.is_empty() {
        store.update_records(category_table, &plan.updates)?;
    }
    if !plan.creates.is_empty() {
        store.create_records(category_table, &plan.creates)?;
    }
    Ok(outcome)
}
