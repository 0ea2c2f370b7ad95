//! Run configuration, read from the credential file and the environment.

use crate::budget::DEFAULT_REQUEST_CEILING;
use crate::error::{BackupError, BackupResult};
use crate::publish::{
    DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, DEFAULT_COMMIT_MESSAGE, DEFAULT_DATA_PATH,
};
use crate::reconcile::DEFAULT_LOOKBACK_DAYS;
use crate::row::FilterPolicy;
use chrono::NaiveDate;
use fitbit_client::config::read_env_file;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_OUTPUT_FILE: &str = "fitbit.csv";
/// First day of recorded history for the step backfill.
pub const DEFAULT_FIRST_DAY: &str = "2015-07-26";

#[derive(Clone, Debug)]
pub struct Config {
    pub client: fitbit_client::config::Config,
    /// Credential file; refreshed tokens are written back here.
    pub env_file: PathBuf,
    /// URL or local path of the last published dataset.
    pub dataset_source: Option<String>,
    /// Repository to publish to; publishing is skipped when unset.
    pub data_repo: Option<String>,
    pub data_path: PathBuf,
    pub output_file: PathBuf,
    pub lookback_days: u32,
    pub request_ceiling: u32,
    pub filter: FilterPolicy,
    pub include_heart_rate: bool,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
    pub first_day: NaiveDate,
}

impl Config {
    /// Load from the file named by `FITBIT_ENV_FILE` (default `.env`).
    pub fn load() -> BackupResult<Self> {
        let path = std::env::var("FITBIT_ENV_FILE").unwrap_or_else(|_| DEFAULT_ENV_FILE.into());
        Self::load_from(Path::new(&path))
    }

    /// Process environment variables take precedence over file values.
    pub fn load_from(path: &Path) -> BackupResult<Self> {
        let file = read_env_file(path)?;
        Self::from_env_with(path.to_path_buf(), |k| {
            std::env::var(k).ok().or_else(|| file.get(k).cloned())
        })
    }

    /// Testable helper that reads configuration values using the provided
    /// function.
    pub fn from_env_with<F>(env_file: PathBuf, mut get: F) -> BackupResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client = fitbit_client::config::Config::from_env_with(&mut get)?;

        let filter = match get("FITBIT_ZERO_FILTER") {
            Some(name) => FilterPolicy::from_name(&name).ok_or_else(|| {
                BackupError::Config(format!(
                    "FITBIT_ZERO_FILTER must be `strict` or `none`, got {name:?}"
                ))
            })?,
            None => FilterPolicy::strict(),
        };
        let first_day = parse_or(
            &mut get,
            "FITBIT_FIRST_DAY",
            DEFAULT_FIRST_DAY.parse::<NaiveDate>().unwrap_or_default(),
        )?;

        Ok(Self {
            client,
            env_file,
            dataset_source: get("FITBIT_DATASET_URL").filter(|s| !s.trim().is_empty()),
            data_repo: get("FITBIT_DATA_REPO").filter(|s| !s.trim().is_empty()),
            data_path: get("FITBIT_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            output_file: get("FITBIT_OUTPUT_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE)),
            lookback_days: parse_or(&mut get, "FITBIT_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?,
            request_ceiling: parse_or(&mut get, "FITBIT_REQUEST_CEILING", DEFAULT_REQUEST_CEILING)?,
            filter,
            include_heart_rate: !parse_or(&mut get, "FITBIT_SKIP_HEART_RATE", false)?,
            commit_message: get("FITBIT_COMMIT_MESSAGE")
                .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.into()),
            author_name: get("FITBIT_GIT_AUTHOR_NAME")
                .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.into()),
            author_email: get("FITBIT_GIT_AUTHOR_EMAIL")
                .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.into()),
            first_day,
        })
    }
}

fn parse_or<F, T>(get: &mut F, key: &str, default: T) -> BackupResult<T>
where
    F: FnMut(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| BackupError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
