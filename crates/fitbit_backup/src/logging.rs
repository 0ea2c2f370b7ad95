/// Configure logging from env var `FITBIT_BACKUP_LOG_LEVEL` (or fallback to
/// `RUST_LOG`, default `info`).
pub fn init_tracing() {
    let log_env = std::env::var("FITBIT_BACKUP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    // Keep HTTP internals quiet by default
    let combined_filter = format!("{},hyper=warn,reqwest=warn", log_env);
    let env_filter = tracing_subscriber::EnvFilter::try_new(combined_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::debug!("fitbit_backup: log filter: {}", log_env);
}
