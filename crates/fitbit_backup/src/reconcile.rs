//! Catch-up sync: replay the trailing window of the dataset up to today.
//!
//! Fitbit can report a day's data several days late (device sync delays), so
//! each run re-fetches the last `lookback_days` stored days instead of
//! starting after them. Fresh rows replace stored ones for the same date, which
//! makes re-running over a complete range a no-op.

use crate::budget::RequestBudget;
use crate::dataset::Dataset;
use crate::error::BackupResult;
use crate::row::RowBuilder;
use chrono::{Days, NaiveDate};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Why the fetch loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    RateLimited { retry_after: Option<u64> },
    /// The remaining request budget could not cover another full day.
    BudgetExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::RateLimited { .. } => "rate_limited",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncReport {
    pub dataset: Dataset,
    /// First and last date of the window that was due for fetching.
    pub window: (NaiveDate, NaiveDate),
    pub fetched: Vec<NaiveDate>,
    pub missing: Vec<NaiveDate>,
    pub requests: u32,
    pub stop: StopReason,
}

impl SyncReport {
    pub fn is_partial(&self) -> bool {
        self.stop != StopReason::Completed
    }
}

/// First date to fetch.
///
/// With a lookback of `n`, the last `n` stored days are fetched again; a
/// lookback of 0 starts the day after the last stored date. An empty dataset
/// starts `max(n, 1)` days back, counting today.
pub fn sync_start(baseline: &Dataset, today: NaiveDate, lookback_days: u32) -> NaiveDate {
    let (anchor, back) = match baseline.last_date() {
        Some(last) => (last.succ_opt().unwrap_or(last), lookback_days),
        None => (today, lookback_days.saturating_sub(1)),
    };
    anchor
        .checked_sub_days(Days::new(u64::from(back)))
        .unwrap_or(NaiveDate::MIN)
}

pub struct Reconciler {
    rows: RowBuilder,
    lookback_days: u32,
}

impl Reconciler {
    pub fn new(rows: RowBuilder, lookback_days: u32) -> Self {
        Self { rows, lookback_days }
    }

    /// Fetch every date from the sync start through `today` and merge the
    /// results into `baseline`.
    ///
    /// A rate-limit response ends the loop early without an error; any other
    /// failure is returned.
    pub async fn reconcile(
        &self,
        baseline: Dataset,
        today: NaiveDate,
        budget: &mut RequestBudget,
    ) -> BackupResult<SyncReport> {
        let start = sync_start(&baseline, today, self.lookback_days);
        let used_before = budget.used();
        tracing::info!(%start, %today, lookback = self.lookback_days, "reconciling");

        let mut dataset = baseline;
        let mut fetched = Vec::new();
        let mut missing = Vec::new();
        let mut stop = StopReason::Completed;

        for date in start.iter_days().take_while(|d| *d <= today) {
            if !budget.can_afford(self.rows.requests_per_row()) {
                tracing::warn!(
                    %date,
                    used = budget.used(),
                    ceiling = budget.ceiling(),
                    "request budget exhausted; stopping"
                );
                stop = StopReason::BudgetExhausted;
                break;
            }
            match self.rows.build_row(date, budget).await {
                Ok(Some(record)) => {
                    dataset.upsert(record);
                    fetched.push(date);
                }
                Ok(None) => missing.push(date),
                Err(e) if e.is_rate_limited() => {
                    let retry_after = e.retry_after();
                    tracing::warn!(
                        %date,
                        ?retry_after,
                        "rate limited; keeping rows fetched so far"
                    );
                    stop = StopReason::RateLimited { retry_after };
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let requests = budget.used() - used_before;
        tracing::info!(
            fetched = fetched.len(),
            missing = missing.len(),
            requests,
            ?stop,
            "reconcile finished"
        );
        Ok(SyncReport {
            dataset,
            window: (start, today),
            fetched,
            missing,
            requests,
            stop,
        })
    }
}
