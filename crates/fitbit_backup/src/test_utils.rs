//! Scripted `FitbitClient` used by unit tests.
#![cfg(test)]

use async_trait::async_trait;
use chrono::NaiveDate;
use fitbit_client::{FitbitClient, FitbitError, Metric, Period, TokenBundle};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// What the upstream reports for one day. `None` means the source has
/// nothing for that day and answers the way Fitbit does (zeros or no key).
#[derive(Clone, Debug, Default)]
pub struct Day {
    pub sleep: Option<(f64, f64, f64)>,
    pub steps: Option<f64>,
    pub body: Option<(f64, f64, f64)>,
    pub resting_hr: Option<f64>,
}

impl Day {
    /// A day with every source populated except resting heart rate.
    pub fn complete(steps: f64) -> Self {
        Self {
            sleep: Some((410.0, 1.0, 445.0)),
            steps: Some(steps),
            body: Some((22.4, 18.1, 70.2)),
            resting_hr: None,
        }
    }
}

#[derive(Default)]
pub struct ScriptedClient {
    days: HashMap<NaiveDate, Day>,
    ranges: HashMap<NaiveDate, Value>,
    rate_limit_from: Option<NaiveDate>,
    calls: Mutex<Vec<(Metric, NaiveDate)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, date: NaiveDate, day: Day) -> Self {
        self.days.insert(date, day);
        self
    }

    pub fn with_range(mut self, anchor: NaiveDate, payload: Value) -> Self {
        self.ranges.insert(anchor, payload);
        self
    }

    /// Every request for `date` or later fails with a 429.
    pub fn rate_limited_from(mut self, date: NaiveDate) -> Self {
        self.rate_limit_from = Some(date);
        self
    }

    pub fn calls(&self) -> Vec<(Metric, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn dates_called(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.calls().into_iter().map(|(_, d)| d).collect();
        dates.dedup();
        dates
    }

    fn check_limit(&self, date: NaiveDate) -> Result<(), FitbitError> {
        match self.rate_limit_from {
            Some(limit) if date >= limit => {
                Err(FitbitError::RateLimitExceeded { retry_after: None })
            }
            _ => Ok(()),
        }
    }
}

pub fn day_payload(metric: Metric, date: NaiveDate, day: &Day) -> Value {
    match metric {
        Metric::Sleep => {
            let (asleep, records, in_bed) = day.sleep.unwrap_or((0.0, 0.0, 0.0));
            json!({
                "sleep": [],
                "summary": {
                    "totalMinutesAsleep": asleep,
                    "totalSleepRecords": records,
                    "totalTimeInBed": in_bed
                }
            })
        }
        Metric::Steps => json!({
            "activities-steps": [
                {"dateTime": date.to_string(), "value": format!("{}", day.steps.unwrap_or(0.0) as i64)}
            ]
        }),
        Metric::Body => {
            let (bmi, fat, weight) = day.body.unwrap_or((0.0, 0.0, 0.0));
            json!({"body": {"bmi": bmi, "fat": fat, "weight": weight}})
        }
        Metric::Heart => {
            let mut value = json!({"customHeartRateZones": [], "heartRateZones": []});
            if let Some(hr) = day.resting_hr {
                value["restingHeartRate"] = json!(hr);
            }
            json!({"activities-heart": [{"dateTime": date.to_string(), "value": value}]})
        }
        Metric::WeightLog => json!({"weight": []}),
    }
}

#[async_trait]
impl FitbitClient for ScriptedClient {
    async fn fetch_daily(&self, metric: Metric, date: NaiveDate) -> Result<Value, FitbitError> {
        self.calls.lock().unwrap().push((metric, date));
        self.check_limit(date)?;
        let day = self.days.get(&date).cloned().unwrap_or_default();
        Ok(day_payload(metric, date, &day))
    }

    async fn fetch_range(
        &self,
        metric: Metric,
        _period: Period,
        anchor_date: NaiveDate,
    ) -> Result<Value, FitbitError> {
        self.calls.lock().unwrap().push((metric, anchor_date));
        self.check_limit(anchor_date)?;
        Ok(self
            .ranges
            .get(&anchor_date)
            .cloned()
            .unwrap_or_else(|| json!({"activities-steps": []})))
    }

    async fn refresh_tokens(&self) -> Result<TokenBundle, FitbitError> {
        Ok(TokenBundle::new("acc", "ref", 0.0))
    }
}
