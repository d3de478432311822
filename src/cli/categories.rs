use colored::Colorize;

use crate::airtable::AirtableClient;
use crate::categories::update_category_monthly_counts;
use crate::cli::SyncArgs;
use crate::config::{DEFAULT_CATEGORY_TABLE, DEFAULT_ORDERS_TABLE};
use crate::error::{Result, SyncError};
use crate::windows::{business_now, monthly_windows};

/// Category refresh on its own: needs only the Airtable credentials, so a
/// failed ad-platform fetch never blocks it.
pub fn run(args: &SyncArgs) -> Result<()> {
    let api_key = args
        .airtable_api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| SyncError::Config("AIRTABLE_API_KEY is required".to_string()))?;
    let base_id = args
        .airtable_base_id
        .as_deref()
        .filter(|base| !base.trim().is_empty())
        .ok_or_else(|| SyncError::Config("AIRTABLE_BASE_ID is required".to_string()))?;
    let orders_table = args.orders_table.as_deref().unwrap_or(DEFAULT_ORDERS_TABLE);
    let category_table = args
        .category_table
        .as_deref()
        .unwrap_or(DEFAULT_CATEGORY_TABLE);

    let store = AirtableClient::new(api_key, base_id)?;
    let windows = monthly_windows(business_now());
    println!(
        "Updating category KPI table '{}' from orders '{}' for {} and {}...",
        category_table,
        orders_table,
        windows.previous.label(),
        windows.current.label()
    );

    let outcome = update_category_monthly_counts(&store, orders_table, category_table, &windows)?;
    println!(
        "{} Updated {} records, created {} records across {} categories.",
        "Done.".green(),
        outcome.updates,
        outcome.creates,
        outcome.categories.len()
    );
    Ok(())
}
