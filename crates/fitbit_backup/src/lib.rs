//! Incremental Fitbit backup: fetch recent daily metrics, merge them into the
//! published CSV dataset and commit it to a git repository.

pub mod budget;
pub mod config;
pub mod dataset;
pub mod error;
pub mod history;
pub mod logging;
pub mod publish;
pub mod reconcile;
pub mod row;
pub mod run;

#[cfg(test)]
mod test_utils;

pub use budget::RequestBudget;
pub use config::Config;
pub use dataset::{Column, DailyRecord, Dataset};
pub use error::{BackupError, BackupResult};
pub use reconcile::{Reconciler, StopReason, SyncReport};
pub use row::{FilterPolicy, RowBuilder, Rule};
