use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use tracing::info;

use crate::airtable::RecordStore;
use crate::error::Result;
use crate::fmt::with_commas;
use crate::kpi::METRIC_NEW_ORDERS;
use crate::record::{to_number, Fields};
use crate::sources::SpendRow;
use crate::windows::MonthlyWindows;

pub const METRIC_CAC: &str = "CAC Converted (aed)";

/// Spend for one calendar month, bounded both by the window's last day and by
/// `today` so a full-month window never counts dates that have not happened.
pub fn sum_spend_for_month(
    rows: &[SpendRow],
    year: i32,
    month: u32,
    day_limit: u32,
    today: NaiveDate,
) -> i64 {
    rows.iter()
        .filter_map(|row| {
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").ok()?;
            (date.year() == year && date.month() == month && date.day() <= day_limit && date <= today)
                .then_some(row.amount)
        })
        .sum()
}

/// Total spend per ISO date, across accounts and platforms.
pub fn spend_by_date(rows: &[SpendRow]) -> HashMap<String, i64> {
    let mut totals: HashMap<String, i64> = HashMap::new();
    for row in rows {
        *totals.entry(row.date.clone()).or_default() += row.amount;
    }
    totals
}

fn cac_value(spend: i64, orders: f64) -> Value {
    if orders <= 0.0 {
        // An empty cell reads as "unknown"; writing 0 would claim free
        // acquisition.
        Value::String(String::new())
    } else {
        Value::String(with_commas(spend as f64 / orders))
    }
}

fn orders_for_label(fields: &Fields, label: &str) -> f64 {
    to_number(fields.get(label)).unwrap_or(0.0)
}

/// Write the monthly CAC row's two month columns from spend totals and the
/// already-persisted `New orders` row. When both spend sums are zero the
/// upstream sources returned nothing and the row is left untouched.
pub fn update_monthly_cac(
    store: &dyn RecordStore,
    kpi_table: &str,
    spend_rows: &[SpendRow],
    windows: &MonthlyWindows,
    today: NaiveDate,
) -> Result<()> {
    let previous = windows.previous;
    let current = windows.current;
    let previous_sum = sum_spend_for_month(
        spend_rows,
        previous.start.year(),
        previous.start.month(),
        previous.end.day(),
        today,
    );
    let current_sum = sum_spend_for_month(
        spend_rows,
        current.start.year(),
        current.start.month(),
        current.end.day(),
        today,
    );
    if previous_sum == 0 && current_sum == 0 {
        info!(table = kpi_table, "no spend in either month, monthly CAC untouched");
        return Ok(());
    }

    let orders_row = store.find_by_metric(kpi_table, METRIC_NEW_ORDERS)?;
    let previous_orders = orders_for_label(&orders_row.fields, &previous.label());
    let current_orders = orders_for_label(&orders_row.fields, &current.label());

    let cac_row = store.find_by_metric(kpi_table, METRIC_CAC)?;
    let mut fields = Fields::new();
    fields.insert(previous.label(), cac_value(previous_sum, previous_orders));
    fields.insert(current.label(), cac_value(current_sum, current_orders));
    store.update_single_record(kpi_table, &cac_row.id, fields)
}

/// Same computation against the daily KPI table for today and the comparable
/// day last month. Skipped when neither day has spend.
pub fn update_daily_cac(
    store: &dyn RecordStore,
    daily_table: &str,
    spend_by_date: &HashMap<String, i64>,
    today: NaiveDate,
    previous_date: NaiveDate,
) -> Result<()> {
    let spend_today = spend_by_date
        .get(&today.format("%Y-%m-%d").to_string())
        .copied()
        .unwrap_or(0);
    let spend_previous = spend_by_date
        .get(&previous_date.format("%Y-%m-%d").to_string())
        .copied()
        .unwrap_or(0);
    if spend_today == 0 && spend_previous == 0 {
        info!(table = daily_table, "no spend on either day, daily CAC untouched");
        return Ok(());
    }

    let orders_row = store.find_by_metric(daily_table, METRIC_NEW_ORDERS)?;
    let today_label = today.format("%B").to_string();
    let previous_label = previous_date.format("%B").to_string();
    let today_orders = orders_for_label(&orders_row.fields, &today_label);
    let previous_orders = orders_for_label(&orders_row.fields, &previous_label);

    let cac_row = store.find_by_metric(daily_table, METRIC_CAC)?;
    let mut fields = Fields::new();
    fields.insert(previous_label, cac_value(spend_previous, previous_orders));
    fields.insert(today_label, cac_value(spend_today, today_orders));
    store.update_single_record(daily_table, &cac_row.id, fields)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::airtable::testing::{record, MockStore};
    use crate::error::SyncError;
    use crate::sources::PLATFORM_META;
    use crate::windows::Window;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(day: &str, amount: i64) -> SpendRow {
        SpendRow {
            date: day.to_string(),
            account_id: "123".to_string(),
            currency: "AED".to_string(),
            amount,
            platform: PLATFORM_META,
        }
    }

    fn windows() -> MonthlyWindows {
        MonthlyWindows {
            previous: Window::new(date(2025, 4, 1), date(2025, 4, 30)),
            current: Window::new(date(2025, 5, 1), date(2025, 5, 15)),
        }
    }

    fn kpi_table() -> Vec<crate::record::Record> {
        vec![
            record("orders", json!({"Metric": "New orders", "April": "40", "May": 25})),
            record("cac", json!({"Metric": "CAC Converted (aed)"})),
        ]
    }

    #[test]
    fn test_sum_spend_respects_month_day_limit_and_today() {
        let rows = vec![
            row("2025-04-10", 100),
            row("2025-04-20", 50),
            row("2025-05-01", 999),
            row("2025-04-25", 70), // beyond today
        ];
        let total = sum_spend_for_month(&rows, 2025, 4, 30, date(2025, 4, 22));
        assert_eq!(total, 150);

        let limited = sum_spend_for_month(&rows, 2025, 4, 15, date(2025, 4, 30));
        assert_eq!(limited, 100);
    }

    #[test]
    fn test_monthly_cac_writes_both_month_columns() {
        let store = MockStore::default().with_table("KPI", kpi_table());
        let rows = vec![row("2025-04-10", 8000), row("2025-05-02", 5000)];

        update_monthly_cac(&store, "KPI", &rows, &windows(), date(2025, 5, 15)).unwrap();

        let writes = store.single_updates.borrow();
        assert_eq!(writes.len(), 1);
        let (table, id, fields) = &writes[0];
        assert_eq!(table, "KPI");
        assert_eq!(id, "cac");
        assert_eq!(fields["April"], json!("200"));
        assert_eq!(fields["May"], json!("200"));
    }

    #[test]
    fn test_monthly_cac_zero_spend_writes_nothing() {
        let store = MockStore::default().with_table("KPI", kpi_table());
        let rows = vec![row("2025-01-10", 8000)]; // outside both windows

        update_monthly_cac(&store, "KPI", &rows, &windows(), date(2025, 5, 15)).unwrap();
        assert!(store.single_updates.borrow().is_empty());
        assert!(store.updates.borrow().is_empty());
    }

    #[test]
    fn test_zero_orders_renders_empty_string() {
        let store = MockStore::default().with_table(
            "KPI",
            vec![
                record("orders", json!({"Metric": "New orders", "May": 10})),
                record("cac", json!({"Metric": "CAC Converted (aed)"})),
            ],
        );
        let rows = vec![row("2025-04-10", 8000), row("2025-05-02", 5000)];

        update_monthly_cac(&store, "KPI", &rows, &windows(), date(2025, 5, 15)).unwrap();

        let writes = store.single_updates.borrow();
        assert_eq!(writes[0].2["April"], json!(""));
        assert_eq!(writes[0].2["May"], json!("500"));
    }

    #[test]
    fn test_missing_new_orders_row_is_an_error() {
        let store = MockStore::default().with_table(
            "KPI",
            vec![record("cac", json!({"Metric": "CAC Converted (aed)"}))],
        );
        let rows = vec![row("2025-05-02", 5000)];
        let err = update_monthly_cac(&store, "KPI", &rows, &windows(), date(2025, 5, 15))
            .unwrap_err();
        assert!(matches!(err, SyncError::MetricNotFound(_, _)));
    }

    #[test]
    fn test_daily_cac_uses_month_labels_of_each_day() {
        let store = MockStore::default().with_table(
            "Daily",
            vec![
                record("orders", json!({"Metric": "New orders", "April": 4, "May": 5})),
                record("cac", json!({"Metric": "CAC Converted (aed)"})),
            ],
        );
        let mut spend = HashMap::new();
        spend.insert("2025-05-12".to_string(), 1000);
        spend.insert("2025-04-14".to_string(), 400);

        update_daily_cac(&store, "Daily", &spend, date(2025, 5, 12), date(2025, 4, 14)).unwrap();

        let writes = store.single_updates.borrow();
        assert_eq!(writes[0].2["April"], json!("100"));
        assert_eq!(writes[0].2["May"], json!("200"));
    }

    #[test]
    fn test_daily_cac_zero_spend_both_days_writes_nothing() {
        let store = MockStore::default().with_table("Daily", kpi_table());
        let spend = HashMap::new();
        update_daily_cac(&store, "Daily", &spend, date(2025, 5, 12), date(2025, 4, 14)).unwrap();
        assert!(store.single_updates.borrow().is_empty());
    }
}
