pub mod categories;
pub mod sync;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spendsync", about = "Sync ad spend and order KPIs into Airtable.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub args: SyncArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch spend, refresh the fact table and every KPI table (default).
    Sync,
    /// Refresh only the category KPI table from the orders table.
    Categories,
}

/// Every flag doubles as an environment variable so the job can run
/// unattended from a scheduler. Required fields are validated in
/// `RuntimeConfig::from_args`, not here, so `categories` can run without
/// the Meta credentials.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Inclusive fetch start date (YYYY-MM-DD). Default: derived from --rolling-days.
    #[arg(long = "start-date", env = "START_DATE", global = true)]
    pub start_date: Option<String>,

    /// Inclusive fetch end date (YYYY-MM-DD). Default: today.
    #[arg(long = "end-date", env = "END_DATE", global = true)]
    pub end_date: Option<String>,

    /// Meta ad account ID without the act_ prefix (repeatable or comma-separated).
    #[arg(long = "account-id", env = "META_AD_ACCOUNT_IDS", global = true)]
    pub account_ids: Vec<String>,

    /// Meta Graph API access token.
    #[arg(long = "meta-access-token", env = "META_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub meta_access_token: Option<String>,

    /// Published CSV URL for Google Ads spend.
    #[arg(long = "google-sheet-url", env = "GOOGLE_SPEND_SHEET_URL", global = true)]
    pub google_sheet_url: Option<String>,

    /// Google Ads account/customer ID.
    #[arg(long = "google-account-id", env = "GOOGLE_ADS_ACCOUNT_ID", global = true)]
    pub google_account_id: Option<String>,

    /// Destination path for the CSV export of fetched rows.
    #[arg(long = "csv-path", env = "CSV_PATH", default_value = "data/meta_spend_daily.csv", global = true)]
    pub csv_path: Option<String>,

    /// Recent days to refresh in the fact table when no start date is given.
    #[arg(long = "rolling-days", env = "ROLLING_DAYS", default_value_t = crate::config::DEFAULT_ROLLING_DAYS, global = true)]
    pub rolling_days: i64,

    /// Airtable API key.
    #[arg(long = "airtable-api-key", env = "AIRTABLE_API_KEY", hide_env_values = true, global = true)]
    pub airtable_api_key: Option<String>,

    /// Airtable base ID.
    #[arg(long = "airtable-base-id", env = "AIRTABLE_BASE_ID", global = true)]
    pub airtable_base_id: Option<String>,

    /// Spend fact table ID (preferred over the name).
    #[arg(long = "spend-table-id", env = "AIRTABLE_TABLE_ID", global = true)]
    pub spend_table_id: Option<String>,

    /// Spend fact table name.
    #[arg(long = "spend-table-name", env = "AIRTABLE_TABLE_NAME", global = true)]
    pub spend_table_name: Option<String>,

    /// Monthly KPI table ID.
    #[arg(long = "kpi-table-id", env = "AIRTABLE_KPI_TABLE_ID", global = true)]
    pub kpi_table_id: Option<String>,

    /// Monthly KPI table name.
    #[arg(long = "kpi-table-name", env = "AIRTABLE_KPI_TABLE_NAME", global = true)]
    pub kpi_table_name: Option<String>,

    /// Daily KPI table ID. Daily CAC runs only when a daily table is set.
    #[arg(long = "daily-kpi-table-id", env = "AIRTABLE_KPI_DAILY_TABLE_ID", global = true)]
    pub daily_kpi_table_id: Option<String>,

    /// Daily KPI table name.
    #[arg(long = "daily-kpi-table-name", env = "AIRTABLE_KPI_DAILY_TABLE_NAME", global = true)]
    pub daily_kpi_table_name: Option<String>,

    /// Orders table identifier.
    #[arg(long = "orders-table", env = "AIRTABLE_ORDERS_TABLE_NAME", global = true)]
    pub orders_table: Option<String>,

    /// Category KPI table identifier.
    #[arg(long = "category-table", env = "AIRTABLE_CATEGORY_KPI_TABLE_NAME", global = true)]
    pub category_table: Option<String>,

    /// Fetch and export only; skip all Airtable writes.
    #[arg(long = "skip-airtable", global = true)]
    pub skip_airtable: bool,
}
