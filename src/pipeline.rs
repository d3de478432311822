use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::airtable::{AirtableClient, RecordStore};
use crate::cac;
use crate::categories;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::kpi;
use crate::ratelimit::{RateLimiter, DEFAULT_CALLS_PER_MINUTE};
use crate::record::Fields;
use crate::sources::{fetch_google_sheet_daily, fetch_meta_daily, http_client, SpendRow};
use crate::windows::{business_now, daily_windows, monthly_windows, required_start_date};

/// Key column of the spend fact table.
pub const FACT_KEY_FIELD: &str = "id";

const CSV_HEADER: [&str; 7] = [
    "id",
    "date",
    "account_id",
    "currency",
    "spend",
    "pulled_at",
    "platform",
];

/// Fact-table row key: `MM/DD/YYYY - {account}`. One row per account per day.
fn fact_row_id(row: &SpendRow) -> String {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map(|d| d.format("%m/%d/%Y").to_string())
        .unwrap_or_else(|_| row.date.clone());
    format!("{date} - {}", row.account_id)
}

fn fact_fields(row: &SpendRow, pulled_at: &str) -> (String, Fields) {
    let id = fact_row_id(row);
    let mut fields = Fields::new();
    fields.insert("id".to_string(), Value::String(id.clone()));
    fields.insert("date".to_string(), Value::String(row.date.clone()));
    fields.insert(
        "account_id".to_string(),
        Value::String(row.account_id.clone()),
    );
    fields.insert("currency".to_string(), Value::String(row.currency.clone()));
    fields.insert("spend".to_string(), Value::from(row.amount));
    fields.insert(
        "pulled_at".to_string(),
        Value::String(pulled_at.to_string()),
    );
    fields.insert(
        "platform".to_string(),
        Value::String(row.platform.to_string()),
    );
    (id, fields)
}

/// All Meta accounts, then the Google sheet when configured, sorted by
/// (account, date) so fact rows land in a stable order.
pub fn fetch_spend(
    config: &RuntimeConfig,
    client: &reqwest::blocking::Client,
    limiter: &RateLimiter,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SpendRow>> {
    let start_str = start.format("%Y-%m-%d").to_string();
    let end_str = end.format("%Y-%m-%d").to_string();

    let mut rows = Vec::new();
    for account_id in &config.meta_account_ids {
        rows.extend(fetch_meta_daily(
            client,
            limiter,
            &config.meta_access_token,
            account_id,
            &start_str,
            &end_str,
        )?);
    }
    if let (Some(sheet_url), Some(account_id)) =
        (&config.google_sheet_url, &config.google_account_id)
    {
        rows.extend(fetch_google_sheet_daily(
            client, limiter, sheet_url, account_id, &start_str, &end_str,
        )?);
    }
    rows.sort_by(|a, b| {
        a.account_id
            .cmp(&b.account_id)
            .then_with(|| a.date.cmp(&b.date))
    });
    Ok(rows)
}

fn export_csv(path: &str, rows: &[SpendRow], pulled_at: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            fact_row_id(row).as_str(),
            &row.date,
            &row.account_id,
            &row.currency,
            &row.amount.to_string(),
            pulled_at,
            row.platform,
        ])?;
    }
    writer.flush()?;
    info!(path, rows = rows.len(), "wrote spend CSV");
    Ok(())
}

/// One full run: fetch spend, upsert the fact table, then refresh KPI
/// tables in dependency order (CAC reads back the order counts written by
/// the KPI step). Steps run sequentially and the first error aborts the run.
pub fn run(config: &RuntimeConfig) -> Result<()> {
    let now = business_now();
    // The KPI lookback can reach further than the fact refresh window; fetch
    // once, wide enough for both.
    let fetch_start = required_start_date(now).min(config.fact_start_date);
    tracing::debug!(
        fact_start = %config.fact_start_date,
        rolling_days = config.fact_rolling_days,
        accounts = config.meta_account_ids.len(),
        "resolved run configuration"
    );

    let client = http_client()?;
    let limiter = RateLimiter::per_minute(DEFAULT_CALLS_PER_MINUTE);
    let rows = fetch_spend(config, &client, &limiter, fetch_start, config.fact_end_date)?;
    info!(
        rows = rows.len(),
        start = %fetch_start,
        end = %config.fact_end_date,
        "fetched spend rows"
    );
    let pulled_at = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();

    if config.skip_airtable {
        info!("skipping Airtable writes");
    } else {
        let store = AirtableClient::new(&config.airtable_api_key, &config.airtable_base_id)?;
        sync_remote(&store, config, &rows, &pulled_at, now)?;
    }

    if let Some(path) = &config.csv_path {
        export_csv(path, &rows, &pulled_at)?;
    }
    Ok(())
}

fn sync_remote(
    store: &dyn RecordStore,
    config: &RuntimeConfig,
    rows: &[SpendRow],
    pulled_at: &str,
    now: chrono::NaiveDateTime,
) -> Result<()> {
    let fact_start = config.fact_start_date.format("%Y-%m-%d").to_string();
    let desired: Vec<(String, Fields)> = rows
        .iter()
        .filter(|row| row.date.as_str() >= fact_start.as_str())
        .map(|row| fact_fields(row, pulled_at))
        .collect();
    info!(rows = desired.len(), table = %config.spend_table, "upserting fact rows");
    store.upsert_by_key(&config.spend_table, FACT_KEY_FIELD, desired)?;

    let windows = monthly_windows(now);
    kpi::update_order_kpis(
        store,
        &config.orders_table,
        &config.monthly_kpi_table,
        &windows,
    )?;
    cac::update_monthly_cac(
        store,
        &config.monthly_kpi_table,
        rows,
        &windows,
        now.date(),
    )?;

    if let Some(daily_table) = &config.daily_kpi_table {
        let (today, previous_day) = daily_windows(now);
        let spend = cac::spend_by_date(rows);
        cac::update_daily_cac(store, daily_table, &spend, today, previous_day)?;
    }

    categories::update_category_monthly_counts(
        store,
        &config.orders_table,
        &config.category_table,
        &windows,
    )?;
    Ok(())
}
