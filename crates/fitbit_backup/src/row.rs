//! Builds one day's record from the sleep, steps, body and heart endpoints.

use crate::budget::RequestBudget;
use crate::dataset::{Column, DailyRecord, Fields, merge_fields};
use crate::error::{BackupError, BackupResult};
use chrono::NaiveDate;
use fitbit_client::{FitbitClient, Metric};
use serde_json::Value;
use std::sync::Arc;

/// Predicate deciding whether a source's values are trustworthy for a day.
#[derive(Clone, Copy, Debug)]
pub enum Rule {
    /// Every value must be strictly positive.
    AllPositive,
    /// Every value must be nonzero.
    AllNonZero,
    /// Keep whatever the API returned.
    Always,
    Custom(fn(&[f64]) -> bool),
}

impl Rule {
    pub fn admits(&self, values: &[f64]) -> bool {
        match self {
            Rule::AllPositive => values.iter().all(|v| *v > 0.0),
            Rule::AllNonZero => values.iter().all(|v| *v != 0.0),
            Rule::Always => true,
            Rule::Custom(f) => f(values),
        }
    }
}

/// Per-source zero filtering. Resting heart rate has no rule: it is kept
/// whenever the payload carries it.
#[derive(Clone, Copy, Debug)]
pub struct FilterPolicy {
    pub sleep: Rule,
    pub steps: Rule,
    pub body: Rule,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl FilterPolicy {
    pub fn strict() -> Self {
        Self {
            sleep: Rule::AllPositive,
            steps: Rule::AllNonZero,
            body: Rule::AllPositive,
        }
    }

    pub fn permissive() -> Self {
        Self {
            sleep: Rule::Always,
            steps: Rule::Always,
            body: Rule::Always,
        }
    }

    /// Parse `strict` or `none`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::strict()),
            "none" | "off" | "permissive" => Some(Self::permissive()),
            _ => None,
        }
    }
}

const SLEEP_FIELDS: [(&str, Column); 3] = [
    ("totalMinutesAsleep", Column::TotalSleepMinutes),
    ("totalSleepRecords", Column::TotalSleepRecords),
    ("totalTimeInBed", Column::TotalTimeInBed),
];

const BODY_FIELDS: [(&str, Column); 3] = [
    ("bmi", Column::Bmi),
    ("fat", Column::BodyFat),
    ("weight", Column::Weight),
];

/// Fitbit sends some numbers as strings (step counts in particular).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn required_number(obj: &Value, key: &str, source: &str) -> BackupResult<f64> {
    let raw = obj
        .get(key)
        .ok_or_else(|| BackupError::Payload(format!("{source}: missing {key}")))?;
    as_number(raw)
        .ok_or_else(|| BackupError::Payload(format!("{source}: {key} is not a number ({raw})")))
}

fn mapped_fields(
    obj: &Value,
    mapping: &[(&str, Column)],
    rule: Rule,
    source: &str,
) -> BackupResult<Fields> {
    let values = mapping
        .iter()
        .map(|(key, _)| required_number(obj, key, source))
        .collect::<BackupResult<Vec<f64>>>()?;
    if !rule.admits(&values) {
        return Ok(Fields::new());
    }
    Ok(mapping.iter().map(|(_, c)| *c).zip(values).collect())
}

/// Sleep summary fields, all or nothing.
pub fn sleep_fields(payload: &Value, rule: Rule) -> BackupResult<Fields> {
    let summary = payload
        .get("summary")
        .ok_or_else(|| BackupError::Payload("sleep: missing summary".into()))?;
    mapped_fields(summary, &SLEEP_FIELDS, rule, "sleep")
}

pub fn steps_fields(payload: &Value, rule: Rule) -> BackupResult<Fields> {
    let entries = payload
        .get("activities-steps")
        .and_then(Value::as_array)
        .ok_or_else(|| BackupError::Payload("steps: missing activities-steps".into()))?;
    let Some(entry) = entries.first() else {
        return Ok(Fields::new());
    };
    let steps = required_number(entry, "value", "steps")?;
    if !rule.admits(&[steps]) {
        return Ok(Fields::new());
    }
    Ok([(Column::Steps, steps)].into())
}

/// Weight, BMI and body fat, all or nothing.
pub fn body_fields(payload: &Value, rule: Rule) -> BackupResult<Fields> {
    let body = payload
        .get("body")
        .ok_or_else(|| BackupError::Payload("body: missing body".into()))?;
    mapped_fields(body, &BODY_FIELDS, rule, "body")
}

/// Resting heart rate when the payload has one; absence is normal.
pub fn heart_fields(payload: &Value) -> BackupResult<Fields> {
    let entries = payload
        .get("activities-heart")
        .and_then(Value::as_array)
        .ok_or_else(|| BackupError::Payload("heart: missing activities-heart".into()))?;
    let resting = entries
        .first()
        .and_then(|e| e.get("value"))
        .and_then(|v| v.get("restingHeartRate"));
    match resting {
        None | Some(Value::Null) => Ok(Fields::new()),
        Some(raw) => {
            let hr = as_number(raw).ok_or_else(|| {
                BackupError::Payload(format!("heart: restingHeartRate is not a number ({raw})"))
            })?;
            Ok([(Column::RestingHeartRate, hr)].into())
        }
    }
}

/// Fetches and filters the sources of a single day.
#[derive(Clone)]
pub struct RowBuilder {
    client: Arc<dyn FitbitClient>,
    policy: FilterPolicy,
    include_heart_rate: bool,
}

impl RowBuilder {
    pub fn new(client: Arc<dyn FitbitClient>, policy: FilterPolicy) -> Self {
        Self {
            client,
            policy,
            include_heart_rate: true,
        }
    }

    pub fn with_heart_rate(mut self, include: bool) -> Self {
        self.include_heart_rate = include;
        self
    }

    /// Requests issued by one [`build_row`](Self::build_row) call.
    pub fn requests_per_row(&self) -> u32 {
        if self.include_heart_rate { 4 } else { 3 }
    }

    async fn fetch(
        &self,
        metric: Metric,
        date: NaiveDate,
        budget: &mut RequestBudget,
    ) -> BackupResult<Value> {
        budget.record(1);
        Ok(self.client.fetch_daily(metric, date).await?)
    }

    /// Build the record for `date`, or `None` if no source had usable data.
    ///
    /// Every request is counted in `budget` before it is sent, so a request
    /// that fails is still accounted for.
    pub async fn build_row(
        &self,
        date: NaiveDate,
        budget: &mut RequestBudget,
    ) -> BackupResult<Option<DailyRecord>> {
        let sleep = sleep_fields(
            &self.fetch(Metric::Sleep, date, budget).await?,
            self.policy.sleep,
        )?;
        let steps = steps_fields(
            &self.fetch(Metric::Steps, date, budget).await?,
            self.policy.steps,
        )?;
        let body = body_fields(&self.fetch(Metric::Body, date, budget).await?, self.policy.body)?;
        let heart = if self.include_heart_rate {
            heart_fields(&self.fetch(Metric::Heart, date, budget).await?)?
        } else {
            Fields::new()
        };

        let fields = [sleep, steps, body, heart]
            .iter()
            .fold(Fields::new(), |acc, source| merge_fields(&acc, source));

        if fields.is_empty() {
            tracing::info!(%date, "no usable data; day skipped");
            return Ok(None);
        }
        tracing::debug!(%date, columns = fields.len(), "built row");
        Ok(Some(DailyRecord::new(date, fields)))
    }
}
