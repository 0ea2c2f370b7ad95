//! `FitbitClient` trait, shared types and the reqwest-based implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod token_store;

#[derive(Debug, Error)]
pub enum FitbitError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimitExceeded { retry_after: Option<u64> },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("decoding payload: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FitbitError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => FitbitError::RateLimitExceeded { retry_after: None },
            404 => FitbitError::NotFound(body),
            401 | 403 => FitbitError::Auth(body),
            400 | 422 => FitbitError::InvalidInput(body),
            _ => FitbitError::Api { status, body },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FitbitError::RateLimitExceeded { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FitbitError::Auth(_))
    }
}

/// Metrics the backup knows how to fetch.
///
/// `Steps`, `Heart` and `WeightLog` are time series resources and can be
/// fetched for a period; `Sleep` and `Body` are single-day summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    Steps,
    Heart,
    WeightLog,
    Sleep,
    Body,
}

impl Metric {
    /// Resource path of the time series endpoint, if the metric has one.
    pub fn time_series_resource(self) -> Option<&'static str> {
        match self {
            Metric::Steps => Some("activities/steps"),
            Metric::Heart => Some("activities/heart"),
            Metric::WeightLog => Some("body/log/weight"),
            Metric::Sleep | Metric::Body => None,
        }
    }

    /// Top-level key holding the entries of a time series payload.
    pub fn series_key(self) -> Option<&'static str> {
        match self {
            Metric::Steps => Some("activities-steps"),
            Metric::Heart => Some("activities-heart"),
            Metric::WeightLog => Some("weight"),
            Metric::Sleep | Metric::Body => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Steps => "steps",
            Metric::Heart => "heart",
            Metric::WeightLog => "weight_log",
            Metric::Sleep => "sleep",
            Metric::Body => "body",
        }
    }
}

/// Period accepted by the time series endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    OneDay,
    SevenDays,
    ThirtyDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::OneWeek => "1w",
            Period::OneMonth => "1m",
            Period::ThreeMonths => "3m",
            Period::SixMonths => "6m",
            Period::OneYear => "1y",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth2 credentials for the Fitbit API.
#[derive(Clone, Debug)]
pub struct TokenBundle {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: f64,
}

impl TokenBundle {
    pub fn new(access_token: &str, refresh_token: &str, expires_at: f64) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: SecretString::new(refresh_token.into()),
            expires_at,
        }
    }

    /// True when the access token is expired or expires within `margin_secs`.
    pub fn expires_within(&self, now: f64, margin_secs: f64) -> bool {
        self.expires_at - now <= margin_secs
    }

    pub fn same_as(&self, other: &TokenBundle) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.refresh_token.expose_secret() == other.refresh_token.expose_secret()
            && self.expires_at == other.expires_at
    }
}

/// Receives refreshed credentials whenever the client renews its tokens.
///
/// A refresh happens as a side effect of an ordinary fetch; this hook makes
/// that effect visible so it can be persisted (see
/// [`TokenStore`](crate::token_store::TokenStore)) or asserted on in tests.
/// An error returned here aborts the fetch that triggered the refresh.
pub trait RefreshObserver: Send + Sync {
    fn tokens_refreshed(&self, tokens: &TokenBundle) -> Result<(), FitbitError>;
}

#[async_trait]
pub trait FitbitClient: Send + Sync + 'static {
    /// Fetch one day of `metric`. Time series metrics use a `1d` period.
    async fn fetch_daily(
        &self,
        metric: Metric,
        date: NaiveDate,
    ) -> Result<serde_json::Value, FitbitError>;

    /// Fetch a time series ending at `anchor_date`.
    ///
    /// Only defined for metrics with a time series resource; others fail with
    /// [`FitbitError::InvalidInput`].
    async fn fetch_range(
        &self,
        metric: Metric,
        period: Period,
        anchor_date: NaiveDate,
    ) -> Result<serde_json::Value, FitbitError>;

    /// Force a token refresh regardless of expiry.
    async fn refresh_tokens(&self) -> Result<TokenBundle, FitbitError>;
}
