//! HTTP client implementation for the Fitbit Web API.
//!
//! This module provides a reqwest-based implementation of the
//! [`FitbitClient`](crate::FitbitClient) trait.

use crate::config::Config;
use crate::{FitbitClient, FitbitError, Metric, Period, RefreshObserver, TokenBundle};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tokens expiring within this many seconds are refreshed before use.
const REFRESH_MARGIN_SECS: f64 = 60.0;

/// Client for the Fitbit Web API using reqwest.
pub struct ReqwestFitbitClient {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    tokens: Mutex<TokenBundle>,
    observer: Option<Arc<dyn RefreshObserver>>,
    client: reqwest::Client,
}

impl std::fmt::Debug for ReqwestFitbitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestFitbitClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct RefreshPayload {
    access_token: String,
    refresh_token: String,
    expires_in: f64,
}

impl ReqwestFitbitClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Fitbit API (e.g., "https://api.fitbit.com")
    /// * `client_id` - OAuth2 client id, used for token refresh
    /// * `client_secret` - OAuth2 client secret, used for token refresh
    /// * `tokens` - The current access/refresh token pair
    pub fn new(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        tokens: TokenBundle,
    ) -> Result<Self, FitbitError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret,
            tokens: Mutex::new(tokens),
            observer: None,
            client,
        })
    }

    pub fn from_config(config: &Config, tokens: TokenBundle) -> Result<Self, FitbitError> {
        Self::new(
            &config.base_url,
            config.client_id.clone(),
            config.client_secret.clone(),
            tokens,
        )
    }

    /// Report every token refresh to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Snapshot of the tokens currently in use.
    pub async fn current_tokens(&self) -> TokenBundle {
        self.tokens.lock().await.clone()
    }

    fn now() -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }

    /// Return a usable access token, refreshing first if it is about to expire.
    async fn access_token(&self) -> Result<SecretString, FitbitError> {
        let mut tokens = self.tokens.lock().await;
        if tokens.expires_within(Self::now(), REFRESH_MARGIN_SECS) {
            tracing::debug!("access token near expiry; refreshing");
            self.refresh_locked(&mut tokens).await?;
        }
        Ok(tokens.access_token.clone())
    }

    /// Exchange the refresh token for a new bundle and report it.
    async fn refresh_locked(&self, tokens: &mut TokenBundle) -> Result<(), FitbitError> {
        let url = format!("{}/oauth2/token", self.base_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.expose_secret()),
        ];
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = snippet(resp.text().await.unwrap_or_default());
            // Any rejection of the refresh grant means the stored credentials are unusable.
            return Err(match status {
                400 | 401 | 403 => FitbitError::Auth(format!("token refresh rejected: {body}")),
                _ => Self::error_for(status, None, body),
            });
        }
        let payload: RefreshPayload = resp
            .json()
            .await
            .map_err(|e| FitbitError::Decode(format!("token refresh response: {e}")))?;

        let refreshed = TokenBundle::new(
            &payload.access_token,
            &payload.refresh_token,
            Self::now() + payload.expires_in,
        );
        metrics::counter!("fitbit_token_refresh_total").increment(1);
        tracing::info!(expires_at = refreshed.expires_at, "refreshed fitbit access token");

        if let Some(observer) = &self.observer {
            observer.tokens_refreshed(&refreshed)?;
        }
        *tokens = refreshed;
        Ok(())
    }

    /// GET a JSON payload with bearer auth.
    ///
    /// A 401 naming `expired_token` triggers one refresh and one replay.
    async fn get_json(
        &self,
        path: &str,
        kind: &'static str,
    ) -> Result<serde_json::Value, FitbitError> {
        let url = format!("{}{}", self.base_url, path);
        let mut replayed = false;
        loop {
            let token = self.access_token().await?;
            metrics::counter!("fitbit_api_requests_total", "endpoint" => kind).increment(1);
            tracing::debug!(endpoint = kind, %url, "fitbit request");

            let resp = self
                .client
                .get(&url)
                .bearer_auth(token.expose_secret())
                .send()
                .await?;
            let status = resp.status();
            if status.is_success() {
                let text = resp.text().await?;
                return serde_json::from_str(&text).map_err(|e| {
                    FitbitError::Decode(format!("{kind}: {e} - body: {}", snippet(text)))
                });
            }

            let retry_after = resp
                .headers()
                .get("retry-after")
                .or_else(|| resp.headers().get("fitbit-rate-limit-reset"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = snippet(resp.text().await.unwrap_or_default());

            if status.as_u16() == 401 && body.contains("expired_token") && !replayed {
                tracing::info!(endpoint = kind, "access token rejected as expired; refreshing");
                let mut tokens = self.tokens.lock().await;
                self.refresh_locked(&mut tokens).await?;
                replayed = true;
                continue;
            }

            if status.as_u16() == 429 {
                tracing::warn!(endpoint = kind, ?retry_after, "fitbit rate limit reached");
            }
            return Err(Self::error_for(status.as_u16(), retry_after, body));
        }
    }

    fn error_for(status: u16, retry_after: Option<u64>, body: String) -> FitbitError {
        match status {
            429 => FitbitError::RateLimitExceeded { retry_after },
            _ => FitbitError::from_status(status, body),
        }
    }

    fn time_series_path(resource: &str, date: NaiveDate, period: Period) -> String {
        format!("/1/user/-/{resource}/date/{date}/{period}.json")
    }
}

fn snippet(body: String) -> String {
    body.chars().take(256).collect()
}

#[async_trait]
impl FitbitClient for ReqwestFitbitClient {
    async fn fetch_daily(
        &self,
        metric: Metric,
        date: NaiveDate,
    ) -> Result<serde_json::Value, FitbitError> {
        let path = match metric {
            Metric::Sleep => format!("/1.2/user/-/sleep/date/{date}.json"),
            Metric::Body => format!("/1/user/-/body/date/{date}.json"),
            _ => {
                let resource = metric.time_series_resource().ok_or_else(|| {
                    FitbitError::InvalidInput(format!("no endpoint for {}", metric.as_str()))
                })?;
                Self::time_series_path(resource, date, Period::OneDay)
            }
        };
        self.get_json(&path, metric.as_str()).await
    }

    async fn fetch_range(
        &self,
        metric: Metric,
        period: Period,
        anchor_date: NaiveDate,
    ) -> Result<serde_json::Value, FitbitError> {
        let resource = metric.time_series_resource().ok_or_else(|| {
            FitbitError::InvalidInput(format!(
                "{} has no time series endpoint",
                metric.as_str()
            ))
        })?;
        let path = Self::time_series_path(resource, anchor_date, period);
        self.get_json(&path, metric.as_str()).await
    }

    async fn refresh_tokens(&self) -> Result<TokenBundle, FitbitError> {
        let mut tokens = self.tokens.lock().await;
        self.refresh_locked(&mut tokens).await?;
        Ok(tokens.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ReqwestFitbitClient {
        ReqwestFitbitClient::new(
            "http://localhost/",
            "client",
            SecretString::new("secret".into()),
            TokenBundle::new("acc", "ref", f64::MAX),
        )
        .expect("client")
    }

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(client().base_url, "http://localhost");
    }

    #[test]
    fn time_series_path_has_period_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            ReqwestFitbitClient::time_series_path("activities/steps", date, Period::OneYear),
            "/1/user/-/activities/steps/date/2024-06-01/1y.json"
        );
    }

    #[test]
    fn error_for_carries_retry_after() {
        let err = ReqwestFitbitClient::error_for(429, Some(120), String::new());
        assert!(matches!(
            err,
            FitbitError::RateLimitExceeded {
                retry_after: Some(120)
            }
        ));
    }

    #[tokio::test]
    async fn fetch_range_rejects_day_summaries() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let res = client()
            .fetch_range(Metric::Sleep, Period::SevenDays, date)
            .await;
        assert!(matches!(res, Err(FitbitError::InvalidInput(_))));
    }
}
