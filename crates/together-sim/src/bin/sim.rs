#![forbid(unsafe_code)]

use anyhow::{Result, bail};
use together_sim::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    let report = run_campaign(&CampaignConfig::default())?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.all_passed() {
        bail!(
            "{} of {} seeds failed; replay seed {:?}",
            report.failures.len(),
            report.seeds_run,
            report.first_failure
        );
    }
    Ok(())
}
