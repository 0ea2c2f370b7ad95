use fitbit_backup::Config;
use fitbit_backup::publish::PublishOutcome;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    fitbit_backup::logging::init_tracing();

    let config = Config::load()?;
    tracing::info!(env_file = %config.env_file.display(), "fitbit_backup: starting run");

    let summary = fitbit_backup::run::run_with_reauth(&config).await?;

    let published = match &summary.publish {
        Some(PublishOutcome::Committed { commit }) => commit.as_str(),
        Some(PublishOutcome::Unchanged) => "unchanged",
        None => "skipped",
    };
    tracing::info!(
        rows = summary.rows,
        fetched = summary.fetched,
        missing = summary.missing,
        requests = summary.requests,
        stop = ?summary.stop,
        output = %summary.output.display(),
        published,
        "fitbit_backup: run complete"
    );
    Ok(())
}
