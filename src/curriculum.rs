pub mod document;
pub mod lifecycle;
pub mod progress;
pub mod store;

use serde::Serialize;
use time::OffsetDateTime;

use document::{WeekRecord, WeekSource, module_total};
use lifecycle::PathStatus;
use progress::reduce;

/// A learner's learning path as currently persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumPath {
    pub id: i64,
    pub learner_id: i64,
    pub title: String,
    /// Fixed when the path is created
    pub total_modules: i64,
    pub completed_modules: i64,
    pub progress_percent: i64,
    pub status: PathStatus,
    pub weeks: Vec<WeekRecord>,
    /// Whether `weeks` came from the stored document or the fallback curriculum
    #[serde(skip)]
    pub week_source: WeekSource,
    /// Bumped by every snapshot write, used for compare-and-swap
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CurriculumPath {
    /// Snapshot derived from the full ledger count. Neither `completed_modules`
    /// nor the status moves back, even if ledger rows disappear.
    pub fn recalculated(&self, completed_count: i64) -> CurriculumPath {
        let floor = self.completed_modules.clamp(0, self.total_modules.max(0));
        let completed_count = completed_count.max(floor);
        let progress = reduce(&self.weeks, self.total_modules, completed_count);
        let status = self
            .status
            .after_recalculation(progress.completed_modules)
            .status();
        CurriculumPath {
            weeks: progress.weeks,
            completed_modules: progress.completed_modules,
            progress_percent: progress.progress_percent,
            status,
            ..self.clone()
        }
    }

    pub fn with_status(&self, target: PathStatus) -> CurriculumPath {
        CurriculumPath {
            status: self.status.request(target).status(),
            ..self.clone()
        }
    }

    /// False when the weeks no longer sum to the fixed `total_modules`, which
    /// happens once a stored document has degraded to the fallback curriculum.
    pub fn weeks_match_total(&self) -> bool {
        module_total(&self.weeks) == self.total_modules
    }

    /// True when the persisted fields of both snapshots are identical.
    pub fn same_snapshot(&self, other: &CurriculumPath) -> bool {
        self.completed_modules == other.completed_modules
            && self.progress_percent == other.progress_percent
            && self.status == other.status
            && self.weeks == other.weeks
    }
}
