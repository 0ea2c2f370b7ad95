//! Full step-count history, fetched one year at a time.

use crate::budget::RequestBudget;
use crate::dataset::{Column, DailyRecord, Dataset, merge_fields};
use crate::error::{BackupError, BackupResult};
use crate::reconcile::StopReason;
use chrono::{Datelike, Months, NaiveDate};
use fitbit_client::{FitbitClient, FitbitError, Metric, Period};
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct StepHistory {
    pub dataset: Dataset,
    pub requests: u32,
    pub stop: StopReason,
}

/// December 31st of every year from `first_day`'s year up to one year past
/// `today`. Each anchor is the end of a `1y` request.
pub fn year_end_anchors(first_day: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let horizon = today.checked_add_months(Months::new(12)).unwrap_or(today);
    (first_day.year()..=horizon.year())
        .filter_map(|y| NaiveDate::from_ymd_opt(y, 12, 31))
        .filter(|d| *d >= first_day && *d <= horizon)
        .collect()
}

/// Positive daily step counts between `first_day` and `today`.
///
/// Stops early, keeping what it has, on a rate-limit response or when the
/// budget is spent.
pub async fn fetch_step_history(
    client: &dyn FitbitClient,
    first_day: NaiveDate,
    today: NaiveDate,
    budget: &mut RequestBudget,
) -> BackupResult<StepHistory> {
    let used_before = budget.used();
    let mut records = Vec::new();
    let mut stop = StopReason::Completed;

    for anchor in year_end_anchors(first_day, today) {
        if !budget.can_afford(1) {
            stop = StopReason::BudgetExhausted;
            break;
        }
        tracing::info!(year = anchor.year(), "fetching step history");
        budget.record(1);
        let payload = match client
            .fetch_range(Metric::Steps, Period::OneYear, anchor)
            .await
        {
            Ok(p) => p,
            Err(FitbitError::RateLimitExceeded { retry_after }) => {
                tracing::warn!(
                    year = anchor.year(),
                    ?retry_after,
                    "rate limited; keeping history fetched so far"
                );
                stop = StopReason::RateLimited { retry_after };
                break;
            }
            Err(e) => return Err(e.into()),
        };
        records.extend(
            step_entries(&payload)?
                .into_iter()
                .filter(|(date, steps)| *steps > 0 && *date >= first_day && *date <= today)
                .map(|(date, steps)| {
                    DailyRecord::new(date, [(Column::Steps, steps as f64)].into())
                }),
        );
    }

    let dataset = Dataset::from_records(records);
    tracing::info!(days = dataset.len(), ?stop, "step history collected");
    Ok(StepHistory {
        dataset,
        requests: budget.used() - used_before,
        stop,
    })
}

/// Fold backfilled rows into `existing` column by column.
///
/// Values already stored win; the backfill only fills columns a stored row
/// lacks, and adds dates the dataset does not have yet.
pub fn fill_gaps(existing: Dataset, backfill: &Dataset) -> Dataset {
    let mut merged = existing;
    for record in backfill.records() {
        let fields = match merged.get(record.date) {
            Some(stored) => merge_fields(&record.fields, &stored.fields),
            None => record.fields.clone(),
        };
        merged.upsert(DailyRecord::new(record.date, fields));
    }
    merged
}

fn step_entries(payload: &Value) -> BackupResult<Vec<(NaiveDate, i64)>> {
    let entries = payload
        .get("activities-steps")
        .and_then(Value::as_array)
        .ok_or_else(|| BackupError::Payload("steps: missing activities-steps".into()))?;
    entries
        .iter()
        .map(|entry| {
            let raw_date = entry
                .get("dateTime")
                .and_then(Value::as_str)
                .ok_or_else(|| BackupError::Payload("steps: entry without dateTime".into()))?;
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .map_err(|e| BackupError::Payload(format!("steps: bad date {raw_date:?}: {e}")))?;
            let steps = match entry.get("value") {
                Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
                Some(Value::Number(n)) => n.as_i64(),
                _ => None,
            }
            .ok_or_else(|| BackupError::Payload(format!("steps: bad value on {raw_date}")))?;
            Ok((date, steps))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedClient, date};
    use serde_json::json;

    #[test]
    fn anchors_run_to_the_year_after_today() {
        let anchors = year_end_anchors(date(2015, 7, 26), date(2017, 3, 1));
        assert_eq!(
            anchors,
            vec![date(2015, 12, 31), date(2016, 12, 31), date(2017, 12, 31)]
        );
        // one year past New Year's Eve still reaches the next year end
        let anchors = year_end_anchors(date(2023, 1, 1), date(2023, 12, 31));
        assert_eq!(anchors, vec![date(2023, 12, 31), date(2024, 12, 31)]);
    }

    #[tokio::test]
    async fn keeps_positive_counts_within_range() {
        let client = ScriptedClient::new()
            .with_range(
                date(2015, 12, 31),
                json!({"activities-steps": [
                    {"dateTime": "2015-07-25", "value": "50"},
                    {"dateTime": "2015-07-26", "value": "1200"},
                    {"dateTime": "2015-07-27", "value": "0"}
                ]}),
            )
            .with_range(
                date(2016, 12, 31),
                json!({"activities-steps": [
                    {"dateTime": "2016-01-01", "value": "3000"},
                    {"dateTime": "2016-02-01", "value": "10"}
                ]}),
            );
        let mut budget = RequestBudget::default();

        let history =
            fetch_step_history(&client, date(2015, 7, 26), date(2016, 1, 15), &mut budget)
                .await
                .unwrap();

        let dates: Vec<NaiveDate> = history.dataset.records().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2015, 7, 26), date(2016, 1, 1)]);
        assert_eq!(
            history.dataset.get(date(2016, 1, 1)).unwrap().get(Column::Steps),
            Some(3000.0)
        );
        assert_eq!(history.requests, 2);
        assert_eq!(history.stop, StopReason::Completed);
    }

    #[tokio::test]
    async fn rate_limit_returns_partial_history() {
        let client = ScriptedClient::new()
            .with_range(
                date(2015, 12, 31),
                json!({"activities-steps": [{"dateTime": "2015-08-01", "value": "700"}]}),
            )
            .rate_limited_from(date(2016, 12, 31));
        let mut budget = RequestBudget::default();

        let history =
            fetch_step_history(&client, date(2015, 7, 26), date(2018, 1, 1), &mut budget)
                .await
                .unwrap();
        assert_eq!(history.dataset.len(), 1);
        assert!(matches!(history.stop, StopReason::RateLimited { .. }));
    }

    #[test]
    fn bad_step_value_is_an_error() {
        let payload = json!({"activities-steps": [{"dateTime": "2016-01-01", "value": "many"}]});
        assert!(matches!(step_entries(&payload), Err(BackupError::Payload(_))));
    }

    #[tokio::test]
    async fn backfilled_steps_fill_rows_without_steps() {
        let client = ScriptedClient::new().with_range(
            date(2016, 12, 31),
            json!({"activities-steps": [
                {"dateTime": "2016-01-01", "value": "3000"},
                {"dateTime": "2016-01-02", "value": "4500"},
                {"dateTime": "2016-01-03", "value": "800"}
            ]}),
        );
        let mut budget = RequestBudget::default();
        let history =
            fetch_step_history(&client, date(2016, 1, 1), date(2016, 1, 31), &mut budget)
                .await
                .unwrap();

        let existing = Dataset::from_records([
            DailyRecord::new(date(2016, 1, 1), [(Column::TotalSleepMinutes, 400.0)].into()),
            DailyRecord::new(date(2016, 1, 2), [(Column::Steps, 4400.0)].into()),
        ]);
        let merged = fill_gaps(existing, &history.dataset);

        let sleepy = merged.get(date(2016, 1, 1)).unwrap();
        assert_eq!(sleepy.get(Column::Steps), Some(3000.0));
        assert_eq!(sleepy.get(Column::TotalSleepMinutes), Some(400.0));
        // stored steps are kept
        assert_eq!(merged.get(date(2016, 1, 2)).unwrap().get(Column::Steps), Some(4400.0));
        assert_eq!(merged.get(date(2016, 1, 3)).unwrap().get(Column::Steps), Some(800.0));
        assert_eq!(merged.len(), 3);
    }
}
