use colored::Colorize;

use crate::cli::SyncArgs;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::pipeline;
use crate::windows::business_now;

pub fn run(args: &SyncArgs) -> Result<()> {
    let today = business_now().date();
    let config = RuntimeConfig::from_args(args, today)?;

    println!(
        "Syncing spend for {} account(s), {} to {}{}",
        config.meta_account_ids.len(),
        config.fact_start_date,
        config.fact_end_date,
        if config.skip_airtable {
            " (Airtable writes skipped)"
        } else {
            ""
        }
    );
    pipeline::run(&config)?;
    println!("{}", "Done.".green());
    Ok(())
}
