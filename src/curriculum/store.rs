use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{
    CurriculumPath,
    document::{self, WeekSource},
    lifecycle::PathStatus,
};
use crate::{
    error::{Error, Result},
    utils::now_utc,
};

#[derive(FromRow)]
struct PathRow {
    id: i64,
    learner_id: i64,
    title: String,
    total_modules: i64,
    completed_modules: i64,
    progress_percent: i64,
    status: String,
    weeks: String,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PathRow> for CurriculumPath {
    type Error = Error;
    fn try_from(row: PathRow) -> Result<Self> {
        let status = row.status.parse::<PathStatus>().map_err(|_| {
            Error::CorruptRecord(format!(
                "curriculum path {} has status {}",
                row.id, row.status
            ))
        })?;
        let parsed = document::parse_weeks_str(&row.weeks);
        if let WeekSource::Fallback(reason) = &parsed.source {
            warn!(
                learner_id = row.learner_id,
                path_id = row.id,
                "stored weeks unusable ({}), serving fallback curriculum",
                reason
            );
        }
        let path = CurriculumPath {
            id: row.id,
            learner_id: row.learner_id,
            title: row.title,
            total_modules: row.total_modules,
            completed_modules: row.completed_modules,
            progress_percent: row.progress_percent,
            status,
            weeks: parsed.weeks,
            week_source: parsed.source,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        if !path.weeks_match_total() {
            warn!(
                learner_id = path.learner_id,
                path_id = path.id,
                total_modules = path.total_modules,
                week_modules = document::module_total(&path.weeks),
                "weeks do not sum to totalModules, progress is allocated up to the smaller"
            );
        }
        Ok(path)
    }
}

/// Persistence of learning paths, one authoritative (latest) path per learner.
#[derive(Debug, Clone)]
pub struct PathStore {
    database: SqlitePool,
}

impl PathStore {
    pub fn new(database: SqlitePool) -> Self {
        Self { database }
    }

    /// Store a new path for the learner from an authored curriculum document.
    ///
    /// `total_modules` is taken from the parsed weeks; an authored total that
    /// disagrees is logged and ignored.
    pub async fn create_path(&self, learner_id: i64, raw: &Value) -> Result<CurriculumPath> {
        let parsed = document::parse_weeks(raw);
        let total_modules = document::module_total(&parsed.weeks);
        match document::authored_total(raw) {
            Some(authored) if authored != total_modules && !parsed.is_fallback() => {
                warn!(
                    learner_id,
                    authored, total_modules, "authored totalModules does not match weeks, repaired"
                );
            }
            _ => {}
        }
        let title = document::document_title(raw);
        let weeks = serde_json::to_string(&parsed.weeks).map_err(anyhow::Error::from)?;
        let now = now_utc();
        let status = PathStatus::Planned;
        let id = sqlx::query(
            "INSERT INTO curriculum_path (learner_id, title, total_modules, completed_modules, progress_percent, status, weeks, version, created_at, updated_at) VALUES (?, ?, ?, 0, 0, ?, ?, 0, ?, ?)",
        )
        .bind(learner_id)
        .bind(&title)
        .bind(total_modules)
        .bind(status.as_str())
        .bind(&weeks)
        .bind(now)
        .bind(now)
        .execute(&self.database)
        .await?
        .last_insert_rowid();
        info!(
            learner_id,
            path_id = id,
            total_modules,
            fallback = parsed.is_fallback(),
            "curriculum path created"
        );
        Ok(CurriculumPath {
            id,
            learner_id,
            title,
            total_modules,
            completed_modules: 0,
            progress_percent: 0,
            status,
            weeks: parsed.weeks,
            week_source: parsed.source,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// The most recently created path of the learner.
    pub async fn latest_path(&self, learner_id: i64) -> Result<Option<CurriculumPath>> {
        let row = sqlx::query_as::<_, PathRow>(
            "SELECT id, learner_id, title, total_modules, completed_modules, progress_percent, status, weeks, version, created_at, updated_at FROM curriculum_path WHERE learner_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(learner_id)
        .fetch_optional(&self.database)
        .await?;
        row.map(CurriculumPath::try_from).transpose()
    }

    /// Write `snapshot` only if the row is still at `snapshot.version`.
    ///
    /// Returns the stored path (version bumped) or `None` when another writer
    /// got there first.
    pub async fn compare_and_swap(
        &self,
        snapshot: &CurriculumPath,
    ) -> Result<Option<CurriculumPath>> {
        let weeks = serde_json::to_string(&snapshot.weeks).map_err(anyhow::Error::from)?;
        let now = now_utc();
        let rows = sqlx::query(
            "UPDATE curriculum_path SET completed_modules = ?, progress_percent = ?, status = ?, weeks = ?, version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(snapshot.completed_modules)
        .bind(snapshot.progress_percent)
        .bind(snapshot.status.as_str())
        .bind(&weeks)
        .bind(now)
        .bind(snapshot.id)
        .bind(snapshot.version)
        .execute(&self.database)
        .await?
        .rows_affected();
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(CurriculumPath {
            version: snapshot.version + 1,
            updated_at: now,
            ..snapshot.clone()
        }))
    }
}
