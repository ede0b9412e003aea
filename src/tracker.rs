//! Keeps each learner's curriculum path in step with the completion ledger.
//!
//! Every recalculation derives the snapshot from the full ledger count, so a
//! dropped or failed run is repaired by the next one. Snapshot writes use a
//! compare-and-swap on the path's `version`: the ledger count is read after
//! the path is loaded, and the write only lands if no other writer committed
//! in between. A stale count can therefore never overwrite a fresher one.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::{
    config::RecalculationConfig,
    curriculum::{
        CurriculumPath, document::WeekSource, lifecycle::PathStatus, store::PathStore,
    },
    error::{Error, Result},
    ledger::{ContentType, Ledger, NewCompletion},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "path", rename_all = "snake_case")]
pub enum RecalcOutcome {
    /// A new snapshot was written
    Updated(CurriculumPath),
    /// The stored snapshot already matched the ledger
    Unchanged(CurriculumPath),
}

impl RecalcOutcome {
    pub fn path(&self) -> &CurriculumPath {
        match self {
            RecalcOutcome::Updated(path) | RecalcOutcome::Unchanged(path) => path,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Recalculate,
    Status(PathStatus),
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    ledger: Ledger,
    paths: PathStore,
    config: RecalculationConfig,
}

impl ProgressTracker {
    pub fn new(database: SqlitePool, config: RecalculationConfig) -> Self {
        Self {
            ledger: Ledger::new(database.clone()),
            paths: PathStore::new(database),
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn create_curriculum_path(
        &self,
        learner_id: i64,
        document: &Value,
    ) -> Result<CurriculumPath> {
        self.paths.create_path(learner_id, document).await
    }

    /// Record a completion and bring the learner's path up to date.
    ///
    /// Only the ledger append can fail this call. Recalculation problems are
    /// logged and left for the next completion to repair.
    pub async fn submit_completion(&self, completion: NewCompletion) -> Result<i64> {
        let record_id = self.ledger.record_completion(&completion).await?;
        self.on_completion_recorded(completion.learner_id).await;
        Ok(record_id)
    }

    /// Recalculate after a ledger append, swallowing (and logging) every failure.
    pub async fn on_completion_recorded(&self, learner_id: i64) -> Option<RecalcOutcome> {
        match self.recalculate(learner_id).await {
            Ok(outcome) => Some(outcome),
            Err(Error::CurriculumNotFound { .. }) => {
                info!(learner_id, "no curriculum path, skip recalculation");
                None
            }
            Err(e) => {
                error!(learner_id, "recalculation failed: {}", e);
                None
            }
        }
    }

    pub async fn recalculate(&self, learner_id: i64) -> Result<RecalcOutcome> {
        self.apply(learner_id, Change::Recalculate).await
    }

    pub async fn get_curriculum_path(&self, learner_id: i64) -> Result<CurriculumPath> {
        self.paths
            .latest_path(learner_id)
            .await?
            .ok_or(Error::CurriculumNotFound { learner_id })
    }

    /// Manually advance the path status. Already at or past `target` is a no-op.
    pub async fn request_status_transition(
        &self,
        learner_id: i64,
        target: PathStatus,
    ) -> Result<CurriculumPath> {
        let outcome = self.apply(learner_id, Change::Status(target)).await?;
        Ok(match outcome {
            RecalcOutcome::Updated(path) | RecalcOutcome::Unchanged(path) => path,
        })
    }

    async fn apply(&self, learner_id: i64, change: Change) -> Result<RecalcOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.backoff_ms);
        for attempt in 1..=max_attempts {
            let current = self.get_curriculum_path(learner_id).await?;
            let next = match change {
                Change::Recalculate => {
                    let completed_count = self
                        .ledger
                        .count_completions(learner_id, &ContentType::ALL)
                        .await?;
                    current.recalculated(completed_count)
                }
                Change::Status(target) => current.with_status(target),
            };
            // a fallback read is always written back so the stored document is repaired
            if current.week_source == WeekSource::Authored && next.same_snapshot(&current) {
                debug!(learner_id, version = current.version, "snapshot unchanged");
                return Ok(RecalcOutcome::Unchanged(current));
            }
            if let Some(stored) = self.paths.compare_and_swap(&next).await? {
                if stored.status != current.status {
                    info!(
                        learner_id,
                        from = %current.status,
                        to = %stored.status,
                        "curriculum path status advanced"
                    );
                }
                debug!(
                    learner_id,
                    version = stored.version,
                    completed_modules = stored.completed_modules,
                    progress_percent = stored.progress_percent,
                    "curriculum path updated"
                );
                return Ok(RecalcOutcome::Updated(stored));
            }
            warn!(
                learner_id,
                attempt,
                version = current.version,
                "curriculum path changed concurrently, retrying"
            );
            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
        Err(Error::ConcurrentUpdateConflict {
            learner_id,
            attempts: max_attempts,
        })
    }
}
