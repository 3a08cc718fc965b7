//! Rewrites legacy stored permissions with the role defaults.
//!
//! Each record is handled on its own with a compare-and-set write, so an
//! administrator edit that lands between our read and our write is kept.
//! Re-running is a no-op once every record is in the current format.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::catalog::defaults_for_role;
use super::matrix::is_current_format;
use super::store::{UserRecord, UserStore};
use crate::errors::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum BackfillOutcome {
    /// Already current format; nothing written.
    Unchanged,
    Rewritten,
    /// The stored value changed after it was read; nothing written.
    Conflict,
    /// Dry run: would have been rewritten.
    Pending,
    Missing,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub outcome: BackfillOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub records: Vec<RecordOutcome>,
}

impl BackfillReport {
    fn count(&self, pred: impl Fn(&BackfillOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn writes(&self) -> usize {
        self.count(|o| *o == BackfillOutcome::Rewritten)
    }

    pub fn conflicts(&self) -> usize {
        self.count(|o| *o == BackfillOutcome::Conflict)
    }

    pub fn failures(&self) -> usize {
        self.count(|o| matches!(o, BackfillOutcome::Failed(_)))
    }

    pub fn outcome_for(&self, user_id: Uuid) -> Option<&BackfillOutcome> {
        self.records.iter().find(|r| r.user_id == user_id).map(|r| &r.outcome)
    }
}

pub struct Backfill {
    store: Arc<dyn UserStore>,
    dry_run: bool,
}

impl Backfill {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store, dry_run: false }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Processes every user in the store.
    pub async fn run(&self) -> AppResult<BackfillReport> {
        let users = self.store.list_users().await?;
        let mut report = BackfillReport::default();
        for record in &users {
            let outcome = self.process(record).await;
            report.records.push(RecordOutcome {
                user_id: record.user_id,
                outcome,
            });
        }
        self.log_summary(&report);
        Ok(report)
    }

    /// Processes only `user_ids`, reading each record individually.
    pub async fn run_for(&self, user_ids: &[Uuid]) -> BackfillReport {
        let mut report = BackfillReport::default();
        for &user_id in user_ids {
            let outcome = match self.store.find_user(user_id).await {
                Ok(Some(record)) => self.process(&record).await,
                Ok(None) => BackfillOutcome::Missing,
                Err(err) => BackfillOutcome::Failed(err.to_string()),
            };
            report.records.push(RecordOutcome { user_id, outcome });
        }
        self.log_summary(&report);
        report
    }

    async fn process(&self, record: &UserRecord) -> BackfillOutcome {
        let stored = record.permissions.as_deref();
        if is_current_format(stored) {
            return BackfillOutcome::Unchanged;
        }

        if self.dry_run {
            return BackfillOutcome::Pending;
        }

        let replacement = defaults_for_role(record.role).to_json();
        match self
            .store
            .compare_and_set_permissions(record.user_id, stored, &replacement)
            .await
        {
            Ok(true) => {
                tracing::info!(user_id = %record.user_id, role = %record.role, "rewrote legacy permissions");
                BackfillOutcome::Rewritten
            }
            Ok(false) => {
                tracing::warn!(user_id = %record.user_id, "permissions changed during backfill, skipping");
                BackfillOutcome::Conflict
            }
            Err(err) => {
                tracing::error!(user_id = %record.user_id, error = %err, "backfill write failed");
                BackfillOutcome::Failed(err.to_string())
            }
        }
    }

    fn log_summary(&self, report: &BackfillReport) {
        tracing::info!(
            processed = report.records.len(),
            rewritten = report.writes(),
            conflicts = report.conflicts(),
            failures = report.failures(),
            dry_run = self.dry_run,
            "permission backfill finished"
        );
    }
}
