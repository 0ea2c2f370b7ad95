//! One backup run: load baseline, reconcile, write, publish.

use crate::budget::RequestBudget;
use crate::config::Config;
use crate::dataset::{self, Dataset};
use crate::error::BackupResult;
use crate::publish::{PublishOutcome, Publisher};
use crate::reconcile::{Reconciler, StopReason};
use crate::row::RowBuilder;
use chrono::NaiveDate;
use fitbit_client::FitbitClient;
use fitbit_client::http_client::ReqwestFitbitClient;
use fitbit_client::token_store::TokenStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub rows: usize,
    pub fetched: usize,
    pub missing: usize,
    pub requests: u32,
    pub stop: StopReason,
    pub output: PathBuf,
    pub publish: Option<PublishOutcome>,
}

/// Build an API client whose refreshed tokens are written back to the
/// credential file.
pub fn connect(config: &Config) -> BackupResult<Arc<ReqwestFitbitClient>> {
    let store = Arc::new(TokenStore::open(&config.env_file));
    let tokens = store.load()?;
    let client = ReqwestFitbitClient::from_config(&config.client, tokens)?.with_observer(store);
    Ok(Arc::new(client))
}

/// Load the last published dataset.
///
/// Reads `FITBIT_DATASET_URL` when set. Otherwise, when publishing is on, the
/// copy tracked by the data repository is the baseline, so a run never
/// replaces the published history with just the fetched window.
pub async fn load_baseline(config: &Config) -> BackupResult<Dataset> {
    match (&config.dataset_source, &config.data_repo) {
        (Some(source), _) => {
            let http = reqwest::Client::builder().build()?;
            dataset::load_baseline(&http, source).await
        }
        (None, Some(repo)) => match publisher(config, repo).tracked_contents().await? {
            Some(bytes) => {
                let dataset = Dataset::from_csv_reader(bytes.as_slice())?;
                tracing::info!(
                    %repo,
                    rows = dataset.len(),
                    last = ?dataset.last_date(),
                    "loaded baseline from data repository"
                );
                Ok(dataset)
            }
            None => {
                tracing::warn!(%repo, "data repository has no dataset yet; starting empty");
                Ok(Dataset::new())
            }
        },
        (None, None) => {
            tracing::warn!("FITBIT_DATASET_URL not set; starting from an empty dataset");
            Ok(Dataset::new())
        }
    }
}

fn publisher(config: &Config, repo: &str) -> Publisher {
    Publisher::new(repo)
        .with_target_path(config.data_path.clone())
        .with_commit_message(config.commit_message.clone())
        .with_author(config.author_name.clone(), config.author_email.clone())
}

pub async fn run(config: &Config) -> BackupResult<RunSummary> {
    let client = connect(config)?;
    run_with_client(config, client, chrono::Local::now().date_naive()).await
}

pub async fn run_with_client(
    config: &Config,
    client: Arc<dyn FitbitClient>,
    today: NaiveDate,
) -> BackupResult<RunSummary> {
    let baseline = load_baseline(config).await?;

    let rows = RowBuilder::new(client, config.filter).with_heart_rate(config.include_heart_rate);
    let reconciler = Reconciler::new(rows, config.lookback_days);
    let mut budget = RequestBudget::new(config.request_ceiling);
    let report = reconciler.reconcile(baseline, today, &mut budget).await?;
    metrics::counter!("fitbit_backup_days_fetched_total").increment(report.fetched.len() as u64);
    metrics::counter!("fitbit_backup_days_missing_total").increment(report.missing.len() as u64);
    metrics::histogram!("fitbit_backup_requests_per_run").record(f64::from(report.requests));
    if report.is_partial() {
        metrics::counter!("fitbit_backup_partial_runs_total", "reason" => report.stop.as_str())
            .increment(1);
        tracing::warn!(stop = ?report.stop, "sync incomplete; publishing partial results");
    }

    let output = dataset::write(&report.dataset, &config.output_file)?;

    let publish = match &config.data_repo {
        Some(repo) => Some(publisher(config, repo).publish(&output).await?),
        None => {
            tracing::info!("FITBIT_DATA_REPO not set; skipping publish");
            None
        }
    };

    Ok(RunSummary {
        rows: report.dataset.len(),
        fetched: report.fetched.len(),
        missing: report.missing.len(),
        requests: report.requests,
        stop: report.stop,
        output,
        publish,
    })
}

/// Run once; on an authentication failure force a token refresh and retry
/// the whole run a single time.
pub async fn run_with_reauth(config: &Config) -> BackupResult<RunSummary> {
    match run(config).await {
        Err(e) if e.is_auth() => {
            tracing::warn!(
                error = %e,
                "authentication failed; refreshing tokens and retrying once"
            );
            let client = connect(config)?;
            client.refresh_tokens().await.inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    "token refresh failed; re-authorize the app and update the credential file"
                );
            })?;
            run(config).await
        }
        other => other,
    }
}
