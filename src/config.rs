use chrono::{Duration, NaiveDate};

use crate::cli::SyncArgs;
use crate::error::{Result, SyncError};

pub const DEFAULT_MONTHLY_KPI_TABLE: &str = "KPI";
pub const DEFAULT_ORDERS_TABLE: &str = "Mamo Transactions";
pub const DEFAULT_CATEGORY_TABLE: &str = "KPI Category Monthly";
pub const DEFAULT_ROLLING_DAYS: i64 = 2;

/// Everything a run needs, resolved and validated before any network call.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// First date refreshed in the spend fact table.
    pub fact_start_date: NaiveDate,
    pub fact_end_date: NaiveDate,
    pub fact_rolling_days: i64,
    pub meta_account_ids: Vec<String>,
    pub meta_access_token: String,
    pub google_sheet_url: Option<String>,
    pub google_account_id: Option<String>,
    pub csv_path: Option<String>,
    pub airtable_api_key: String,
    pub airtable_base_id: String,
    /// Spend fact table, id preferred over name.
    pub spend_table: String,
    pub monthly_kpi_table: String,
    pub daily_kpi_table: Option<String>,
    pub orders_table: String,
    pub category_table: String,
    pub skip_airtable: bool,
}

/// Split a comma-separated account list, trimming and stripping the `act_`
/// prefix the Graph API adds itself.
pub fn parse_account_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.strip_prefix("act_").unwrap_or(part).to_string())
        .collect()
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| SyncError::Config(format!("{flag} must be YYYY-MM-DD, got '{value}'")))
}

fn required(value: &Option<String>, what: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(SyncError::Config(format!("{what} is required"))),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

impl RuntimeConfig {
    pub fn from_args(args: &SyncArgs, today: NaiveDate) -> Result<Self> {
        let fact_end_date = match &args.end_date {
            Some(raw) => parse_date("--end-date", raw)?,
            None => today,
        };
        let fact_rolling_days = if args.rolling_days <= 0 {
            DEFAULT_ROLLING_DAYS
        } else {
            args.rolling_days
        };
        let fact_start_date = match &args.start_date {
            Some(raw) => parse_date("--start-date", raw)?,
            None => fact_end_date - Duration::days(fact_rolling_days - 1),
        };
        if fact_start_date > fact_end_date {
            return Err(SyncError::Config(
                "start date must be before or equal to end date".to_string(),
            ));
        }

        let meta_account_ids: Vec<String> = args
            .account_ids
            .iter()
            .flat_map(|raw| parse_account_ids(raw))
            .collect();
        if meta_account_ids.is_empty() {
            return Err(SyncError::Config(
                "no Meta account ids provided (--account-id or META_AD_ACCOUNT_IDS)".to_string(),
            ));
        }

        let spend_table = non_empty(&args.spend_table_id)
            .or_else(|| non_empty(&args.spend_table_name))
            .ok_or_else(|| {
                SyncError::Config(
                    "provide AIRTABLE_TABLE_ID or AIRTABLE_TABLE_NAME for the spend table"
                        .to_string(),
                )
            })?;

        Ok(Self {
            fact_start_date,
            fact_end_date,
            fact_rolling_days,
            meta_account_ids,
            meta_access_token: required(&args.meta_access_token, "META_ACCESS_TOKEN")?,
            google_sheet_url: non_empty(&args.google_sheet_url),
            google_account_id: non_empty(&args.google_account_id),
            csv_path: non_empty(&args.csv_path),
            airtable_api_key: required(&args.airtable_api_key, "AIRTABLE_API_KEY")?,
            airtable_base_id: required(&args.airtable_base_id, "AIRTABLE_BASE_ID")?,
            spend_table,
            monthly_kpi_table: non_empty(&args.kpi_table_id)
                .or_else(|| non_empty(&args.kpi_table_name))
                .unwrap_or_else(|| DEFAULT_MONTHLY_KPI_TABLE.to_string()),
            daily_kpi_table: non_empty(&args.daily_kpi_table_id)
                .or_else(|| non_empty(&args.daily_kpi_table_name)),
            orders_table: non_empty(&args.orders_table)
                .unwrap_or_else(|| DEFAULT_ORDERS_TABLE.to_string()),
            category_table: non_empty(&args.category_table)
                .unwrap_or_else(|| DEFAULT_CATEGORY_TABLE.to_string()),
            skip_airtable: args.skip_airtable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SyncArgs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn complete_args() -> SyncArgs {
        SyncArgs {
            account_ids: vec!["act_123, 456".to_string()],
            meta_access_token: Some("token".to_string()),
            airtable_api_key: Some("key".to_string()),
            airtable_base_id: Some("app123".to_string()),
            spend_table_id: Some("tbl123".to_string()),
            ..SyncArgs::default()
        }
    }

    #[test]
    fn test_parse_account_ids_strips_prefix_and_blanks() {
        assert_eq!(
            parse_account_ids("act_123, 456 ,, act_789"),
            vec!["123", "456", "789"]
        );
        assert!(parse_account_ids("  ").is_empty());
    }

    #[test]
    fn test_rolling_days_derive_start_date() {
        let config = RuntimeConfig::from_args(&complete_args(), date(2025, 5, 15)).unwrap();
        assert_eq!(config.fact_rolling_days, DEFAULT_ROLLING_DAYS);
        assert_eq!(config.fact_start_date, date(2025, 5, 14));
        assert_eq!(config.fact_end_date, date(2025, 5, 15));
    }

    #[test]
    fn test_explicit_dates_override_rolling_window() {
        let mut args = complete_args();
        args.start_date = Some("2025-04-01".to_string());
        args.end_date = Some("2025-04-30".to_string());
        let config = RuntimeConfig::from_args(&args, date(2025, 5, 15)).unwrap();
        assert_eq!(config.fact_start_date, date(2025, 4, 1));
        assert_eq!(config.fact_end_date, date(2025, 4, 30));
    }

    #[test]
    fn test_start_after_end_rejected() {
        let mut args = complete_args();
        args.start_date = Some("2025-05-20".to_string());
        args.end_date = Some("2025-05-10".to_string());
        let err = RuntimeConfig::from_args(&args, date(2025, 5, 15)).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_missing_credentials_rejected_per_field() {
        let strips: [fn(&mut SyncArgs); 5] = [
            |a| a.meta_access_token = None,
            |a| a.airtable_api_key = None,
            |a| a.airtable_base_id = None,
            |a| a.account_ids = vec![],
            |a| a.spend_table_id = None,
        ];
        for strip in strips {
            let mut args = complete_args();
            strip(&mut args);
            let err = RuntimeConfig::from_args(&args, date(2025, 5, 15)).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)));
        }
    }

    #[test]
    fn test_table_name_accepted_when_id_absent() {
        let mut args = complete_args();
        args.spend_table_id = None;
        args.spend_table_name = Some("Spend Facts".to_string());
        args.kpi_table_name = Some("KPI Monthly".to_string());
        let config = RuntimeConfig::from_args(&args, date(2025, 5, 15)).unwrap();
        assert_eq!(config.spend_table, "Spend Facts");
        assert_eq!(config.monthly_kpi_table, "KPI Monthly");
    }

    #[test]
    fn test_defaults_for_kpi_and_orders_tables() {
        let config = RuntimeConfig::from_args(&complete_args(), date(2025, 5, 15)).unwrap();
        assert_eq!(config.monthly_kpi_table, DEFAULT_MONTHLY_KPI_TABLE);
        assert_eq!(config.orders_table, DEFAULT_ORDERS_TABLE);
        assert_eq!(config.category_table, DEFAULT_CATEGORY_TABLE);
        assert!(config.daily_kpi_table.is_none());
        assert!(config.csv_path.is_none());
    }

    #[test]
    fn test_bad_date_format_rejected() {
        let mut args = complete_args();
        args.start_date = Some("15/05/2025".to_string());
        let err = RuntimeConfig::from_args(&args, date(2025, 5, 15)).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
