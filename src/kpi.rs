use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use crate::airtable::RecordStore;
use crate::dates::to_business_date;
use crate::error::Result;
use crate::fmt::with_commas;
use crate::record::{normalize_enum_text, to_number, FieldSpec, Fields};
use crate::reconcile::RecordUpdate;
use crate::windows::MonthlyWindows;

// ---------------------------------------------------------------------------
// Order classification
// ---------------------------------------------------------------------------

/// Only captured payments count. Compared against `normalize_enum_text`
/// output, so the constants are stored pre-normalized.
pub(crate) const STATUS_EXPECTED: &str = "captured";
const TYPE_NEW_SUB: &str = "new sub";
const TYPE_RENEWAL: &str = "sub renewal";

pub(crate) const STATUS_FIELD: FieldSpec = FieldSpec::new("status", &["Status"]);
const DATE_FIELD: FieldSpec = FieldSpec::new(
    "created_date",
    &["createdDate", "Created Date", "Order Date", "date", "Date"],
);
const TYPE_FIELD: FieldSpec = FieldSpec::new("Type", &[]);
const AMOUNT_FIELD: FieldSpec = FieldSpec::new("amount", &["Amount"]);
const PRODUCT_LINK_FIELD: FieldSpec = FieldSpec::new("Product", &[]);

const METRIC_NAME_FIELD: &str = "Metric";

/// Toggles restricting the headline order/revenue/AOV metrics to
/// subscription orders only. All default to the full order set.
const ORDERS_USE_SUBS_ONLY: bool = false;
const REVENUE_USE_SUBS_ONLY: bool = false;
const AOV_USE_SUBS_ONLY: bool = false;

pub const METRIC_REVENUE: &str = "Revenue (aed)";
pub const METRIC_ORDERS: &str = "Nbr Order";
pub const METRIC_AOV: &str = "AOV (aed)";
pub const METRIC_EXISTING: &str = "Existing";
pub const METRIC_NEW_ORDERS: &str = "New orders";
pub const METRIC_MULTIPLE_ORDERS: &str = "Multiple orders";

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Per-window aggregate over order records.
/// Invariant: existing <= orders_subs <= orders_all, multiple_orders <= orders_all.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrderBucket {
    pub orders_all: u64,
    pub revenue_all: f64,
    pub orders_subs: u64,
    pub revenue_subs: f64,
    pub existing: u64,
    pub multiple_orders: u64,
}

/// Fold one order into a bucket. Orders always count; revenue only when the
/// amount parses; renewal-type orders also bump `existing`; an order linked
/// to more than one product bumps `multiple_orders`.
pub fn accumulate(fields: &Fields, bucket: &mut OrderBucket) {
    bucket.orders_all += 1;

    let amount = to_number(AMOUNT_FIELD.resolve(fields));
    if let Some(amount) = amount {
        bucket.revenue_all += amount;
    }

    let order_type = normalize_enum_text(TYPE_FIELD.resolve(fields));
    if order_type == TYPE_NEW_SUB || order_type == TYPE_RENEWAL {
        bucket.orders_subs += 1;
        if let Some(amount) = amount {
            bucket.revenue_subs += amount;
        }
        if order_type == TYPE_RENEWAL {
            bucket.existing += 1;
        }
    }

    if let Some(Value::Array(links)) = PRODUCT_LINK_FIELD.resolve(fields) {
        if links.iter().filter(|link| !link.is_null()).count() > 1 {
            bucket.multiple_orders += 1;
        }
    }
}

/// Derive the named metrics for one bucket. AOV is 0 when there are no
/// orders; `New orders` never goes negative.
pub fn compute_metrics(bucket: &OrderBucket) -> BTreeMap<&'static str, f64> {
    let orders = if ORDERS_USE_SUBS_ONLY {
        bucket.orders_subs
    } else {
        bucket.orders_all
    } as f64;
    let revenue = if REVENUE_USE_SUBS_ONLY {
        bucket.revenue_subs
    } else {
        bucket.revenue_all
    };

    let aov_orders = if AOV_USE_SUBS_ONLY {
        bucket.orders_subs
    } else {
        bucket.orders_all
    } as f64;
    let aov_revenue = if AOV_USE_SUBS_ONLY {
        bucket.revenue_subs
    } else {
        bucket.revenue_all
    };
    let aov = if aov_orders > 0.0 {
        (aov_revenue / aov_orders).round()
    } else {
        0.0
    };

    let existing = bucket.existing as f64;
    let new_orders = (orders - existing).max(0.0);

    BTreeMap::from([
        (METRIC_REVENUE, revenue),
        (METRIC_ORDERS, orders),
        (METRIC_AOV, aov),
        (METRIC_EXISTING, existing),
        (METRIC_NEW_ORDERS, new_orders),
        (METRIC_MULTIPLE_ORDERS, bucket.multiple_orders as f64),
    ])
}

// ---------------------------------------------------------------------------
// Monthly KPI refresh
// ---------------------------------------------------------------------------

/// Scan orders once, bucket them into the two windows, then write metric
/// values into the two month-labeled columns of every known KPI row. Rows
/// with unrecognized metric names are left untouched.
///
/// A record whose business date falls in both windows is counted into both
/// buckets. With the standard month windows that cannot happen; overlapping
/// windows double-count by design.
pub fn update_order_kpis(
    store: &dyn RecordStore,
    orders_table: &str,
    kpi_table: &str,
    windows: &MonthlyWindows,
) -> Result<()> {
    let previous = windows.previous;
    let current = windows.current;
    let label_previous = previous.label();
    let label_current = current.label();

    let mut previous_bucket = OrderBucket::default();
    let mut current_bucket = OrderBucket::default();

    for record in store.list_records(orders_table, None, None)? {
        let fields = &record.fields;
        if normalize_enum_text(STATUS_FIELD.resolve(fields)) != STATUS_EXPECTED {
            continue;
        }
        let Some(order_date) = DATE_FIELD.resolve(fields).and_then(to_business_date) else {
            continue;
        };
        if order_date < previous.start || order_date > current.end {
            continue;
        }
        if previous.contains(order_date) {
            accumulate(fields, &mut previous_bucket);
        }
        if current.contains(order_date) {
            accumulate(fields, &mut current_bucket);
        }
    }

    let previous_metrics = compute_metrics(&previous_bucket);
    let current_metrics = compute_metrics(&current_bucket);

    let mut updates = Vec::new();
    for record in store.list_records(kpi_table, None, None)? {
        let Some(Value::String(metric_name)) = record.fields.get(METRIC_NAME_FIELD) else {
            continue;
        };
        let metric_key = metric_name.trim();
        let (Some(previous_value), Some(current_value)) =
            (previous_metrics.get(metric_key), current_metrics.get(metric_key))
        else {
            continue;
        };
        let mut fields = Fields::new();
        fields.insert(label_previous.clone(), Value::String(with_commas(*previous_value)));
        fields.insert(label_current.clone(), Value::String(with_commas(*current_value)));
        updates.push(RecordUpdate {
            id: record.id,
            fields,
        });
    }

    if !updates.is_empty() {
        info!(count = updates.len(), table = kpi_table, "updating order KPI rows");
        store.update_records(kpi_table, &updates)?;
    }
    Ok(())
}
