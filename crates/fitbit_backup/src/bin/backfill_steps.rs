//! Fetch the complete step history year by year and fold it into the dataset.
//!
//! Stored values win over backfilled ones; the backfill only fills in step
//! counts that are missing, so it never overwrites what the regular backup
//! already recorded.

use fitbit_backup::history::{fetch_step_history, fill_gaps};
use fitbit_backup::{Config, RequestBudget, dataset};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    fitbit_backup::logging::init_tracing();

    let config = Config::load()?;
    let client = fitbit_backup::run::connect(&config)?;
    let existing = fitbit_backup::run::load_baseline(&config).await?;

    let today = chrono::Local::now().date_naive();
    let mut budget = RequestBudget::new(config.request_ceiling);
    let history =
        fetch_step_history(client.as_ref(), config.first_day, today, &mut budget).await?;

    let before = existing.len();
    let backfilled = history.dataset.len();
    let merged = fill_gaps(existing, &history.dataset);
    let output = dataset::write(&merged, &config.output_file)?;
    tracing::info!(
        backfilled,
        added = merged.len() - before,
        requests = history.requests,
        stop = ?history.stop,
        output = %output.display(),
        "backfill_steps: done"
    );
    Ok(())
}
