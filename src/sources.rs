use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::http::RetryPolicy;
use crate::ratelimit::RateLimiter;

pub const META_API_VERSION: &str = "v23.0";

pub const PLATFORM_META: &str = "meta";
pub const PLATFORM_GOOGLE: &str = "google_ads";

const DEFAULT_CURRENCY: &str = "AED";

/// One day of spend for one ad account. Amounts are whole currency units,
/// rounded half-up from the decimal value the platform reports; integers keep
/// pagination boundaries from accumulating penny drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRow {
    pub date: String,
    pub account_id: String,
    pub currency: String,
    pub amount: i64,
    pub platform: &'static str,
}

pub fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?)
}

fn round_to_unit(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Meta insights
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    data: Vec<InsightRow>,
    paging: Option<InsightsPaging>,
}

#[derive(Deserialize)]
struct InsightRow {
    date_start: Option<String>,
    spend: Option<String>,
    account_currency: Option<String>,
}

#[derive(Deserialize)]
struct InsightsPaging {
    next: Option<String>,
}

fn insight_to_row(insight: InsightRow, account_id: &str) -> Option<SpendRow> {
    let date = insight.date_start?;
    let spend = insight.spend.unwrap_or_default();
    let spend = if spend.is_empty() { "0" } else { spend.as_str() };
    let amount = match spend.parse::<Decimal>() {
        Ok(value) => round_to_unit(value),
        Err(_) => {
            debug!(date, spend, "unparseable Meta spend value, skipping day");
            return None;
        }
    };
    let currency = insight
        .account_currency
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    Some(SpendRow {
        date,
        account_id: account_id.to_string(),
        currency,
        amount,
        platform: PLATFORM_META,
    })
}

/// Per-day account-level spend from the Meta Graph API, following the
/// `paging.next` cursor. Every page passes through the shared rate limiter.
pub fn fetch_meta_daily(
    client: &reqwest::blocking::Client,
    limiter: &RateLimiter,
    access_token: &str,
    account_id: &str,
    start_date: &str,
    end_date: &str,
) -> Result<Vec<SpendRow>> {
    let first_url = format!("https://graph.facebook.com/{META_API_VERSION}/act_{account_id}/insights");
    let params = [
        ("fields", "spend,account_currency,date_start".to_string()),
        ("time_increment", "1".to_string()),
        ("level", "account".to_string()),
        ("time_range[since]", start_date.to_string()),
        ("time_range[until]", end_date.to_string()),
        ("access_token", access_token.to_string()),
        ("limit", "1000".to_string()),
    ];
    let policy = RetryPolicy::new("meta").with_transient_403();

    let mut rows = Vec::new();
    let mut next_url = Some(first_url);
    let mut first = true;
    while let Some(url) = next_url.take() {
        limiter.acquire();
        let response = policy.execute(|| {
            let mut request = client.get(&url);
            if first {
                request = request.query(&params);
            }
            request.send()
        })?;
        first = false;

        let payload: InsightsResponse = response.json()?;
        rows.extend(
            payload
                .data
                .into_iter()
                .filter_map(|insight| insight_to_row(insight, account_id)),
        );
        next_url = payload.paging.and_then(|paging| paging.next);
    }

    rows.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Google Ads via published sheet
// ---------------------------------------------------------------------------

fn normalize_header(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Recognized names for the cost column, in priority order.
const COST_ALIASES: &[&str] = &["costmicros", "cost", "amount"];

/// Parse the CSV body of a published spend sheet. Preamble lines before the
/// header row (first cell `date`, case-insensitive) are skipped; cost values
/// are summed per date as decimals and rounded half-up once per day.
pub fn parse_sheet_csv(
    body: &str,
    account_id: &str,
    start_date: &str,
    end_date: &str,
) -> Result<Vec<SpendRow>> {
    let mut filtered: Vec<&str> = Vec::new();
    let mut header_found = false;
    for line in body.lines() {
        if header_found {
            filtered.push(line);
            continue;
        }
        if line.trim().to_lowercase().starts_with("date") && line.contains(',') {
            header_found = true;
            filtered.push(line);
        }
    }
    if !header_found {
        return Err(SyncError::Sheet("missing header row".to_string()));
    }

    let joined = filtered.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(joined.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let date_idx = headers.iter().position(|name| name == "date");
    let cost_idx = COST_ALIASES
        .iter()
        .find_map(|alias| headers.iter().position(|name| name == alias));
    let (Some(date_idx), Some(cost_idx)) = (date_idx, cost_idx) else {
        return Err(SyncError::Sheet("missing Date or Cost column".to_string()));
    };

    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for row in reader.records() {
        let Ok(row) = row else { continue };
        let date_raw = row.get(date_idx).unwrap_or("").trim();
        if date_raw.is_empty() {
            continue;
        }
        let date = if date_raw.contains('-') {
            date_raw.to_string()
        } else {
            match NaiveDate::parse_from_str(date_raw, "%d/%m/%Y") {
                Ok(parsed) => parsed.format("%Y-%m-%d").to_string(),
                Err(_) => continue,
            }
        };
        if date.as_str() < start_date || date.as_str() > end_date {
            continue;
        }
        let cost_raw = row.get(cost_idx).unwrap_or("").trim();
        let cost = if cost_raw.is_empty() {
            Decimal::ZERO
        } else {
            match cost_raw.replace(',', "").parse::<Decimal>() {
                Ok(value) => value,
                Err(_) => {
                    debug!(date = date.as_str(), cost_raw, "unparseable sheet cost, skipping row");
                    continue;
                }
            }
        };
        *totals.entry(date).or_insert(Decimal::ZERO) += cost;
    }

    Ok(totals
        .into_iter()
        .map(|(date, amount)| SpendRow {
            date,
            account_id: account_id.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            amount: round_to_unit(amount),
            platform: PLATFORM_GOOGLE,
        })
        .collect())
}

/// Daily Google Ads spend from a published CSV sheet.
pub fn fetch_google_sheet_daily(
    client: &reqwest::blocking::Client,
    limiter: &RateLimiter,
    sheet_url: &str,
    account_id: &str,
    start_date: &str,
    end_date: &str,
) -> Result<Vec<SpendRow>> {
    if sheet_url.is_empty() {
        return Ok(Vec::new());
    }
    limiter.acquire();
    let policy = RetryPolicy::new("google_sheet");
    let response = policy.execute(|| client.get(sheet_url).send())?;
    let body = response.text()?;
    parse_sheet_csv(&body, account_id, start_date, end_date)
}
