//! Append-only record of quiz and coding-challenge completions.
//!
//! Counts are always recomputed from the stored rows, there are no cached
//! counters to drift out of sync with the ledger.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    error::{Error, Result},
    utils::now_utc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Quiz,
    CodingChallenge,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Quiz, ContentType::CodingChallenge];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Quiz => "quiz",
            ContentType::CodingChallenge => "coding-challenge",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quiz" => Ok(ContentType::Quiz),
            "coding-challenge" => Ok(ContentType::CodingChallenge),
            other => Err(Error::InvalidInput(format!("unknown content type: {other}"))),
        }
    }
}

/// A completion as submitted by the quiz delivery side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompletion {
    pub learner_id: i64,
    pub content_id: String,
    pub content_type: ContentType,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: i64,
    /// seconds
    pub time_spent: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl NewCompletion {
    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(Error::InvalidInput("content id is empty".to_string()));
        }
        if self.score < 0 || self.total_questions < 0 || self.time_spent < 0 {
            return Err(Error::InvalidInput(format!(
                "negative score/total/time: {}/{}/{}",
                self.score, self.total_questions, self.time_spent
            )));
        }
        if !(0..=100).contains(&self.percentage) {
            return Err(Error::InvalidInput(format!(
                "percentage out of range: {}",
                self.percentage
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletionRecord {
    pub id: i64,
    pub learner_id: i64,
    pub content_id: String,
    pub content_type: ContentType,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: i64,
    pub time_spent: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

#[derive(FromRow)]
struct CompletionRow {
    id: i64,
    learner_id: i64,
    content_id: String,
    content_type: String,
    score: i64,
    total_questions: i64,
    percentage: i64,
    time_spent: i64,
    completed_at: OffsetDateTime,
}

impl TryFrom<CompletionRow> for CompletionRecord {
    type Error = Error;
    fn try_from(row: CompletionRow) -> Result<Self> {
        let content_type = row.content_type.parse().map_err(|_| {
            Error::CorruptRecord(format!(
                "completion {} has content type {}",
                row.id, row.content_type
            ))
        })?;
        Ok(CompletionRecord {
            id: row.id,
            learner_id: row.learner_id,
            content_id: row.content_id,
            content_type,
            score: row.score,
            total_questions: row.total_questions,
            percentage: row.percentage,
            time_spent: row.time_spent,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CompletionSummary {
    pub quizzes: i64,
    pub coding_challenges: i64,
    /// None while the learner has no completions
    pub average_percentage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    database: SqlitePool,
}

impl Ledger {
    pub fn new(database: SqlitePool) -> Self {
        Self { database }
    }

    /// Append one completion, returns the new record id.
    pub async fn record_completion(&self, completion: &NewCompletion) -> Result<i64> {
        completion.validate()?;
        let completed_at = completion.completed_at.unwrap_or_else(now_utc);
        let id = sqlx::query(
            "INSERT INTO completion_record (learner_id, content_id, content_type, score, total_questions, percentage, time_spent, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(completion.learner_id)
        .bind(&completion.content_id)
        .bind(completion.content_type.as_str())
        .bind(completion.score)
        .bind(completion.total_questions)
        .bind(completion.percentage)
        .bind(completion.time_spent)
        .bind(completed_at)
        .execute(&self.database)
        .await?
        .last_insert_rowid();
        debug!(
            learner_id = completion.learner_id,
            record_id = id,
            content_type = %completion.content_type,
            "completion recorded"
        );
        Ok(id)
    }

    /// Number of completions of the given types, all types when `types` is empty.
    pub async fn count_completions(&self, learner_id: i64, types: &[ContentType]) -> Result<i64> {
        let types = if types.is_empty() {
            &ContentType::ALL[..]
        } else {
            types
        };
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM completion_record WHERE learner_id = ");
        query.push_bind(learner_id);
        query.push(" AND content_type IN (");
        let mut separated = query.separated(", ");
        for content_type in types {
            separated.push_bind(content_type.as_str());
        }
        separated.push_unseparated(")");
        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.database)
            .await?;
        Ok(count)
    }

    /// Newest first.
    pub async fn recent_completions(
        &self,
        learner_id: i64,
        limit: i64,
    ) -> Result<Vec<CompletionRecord>> {
        let rows = sqlx::query_as::<_, CompletionRow>(
            "SELECT id, learner_id, content_id, content_type, score, total_questions, percentage, time_spent, completed_at FROM completion_record WHERE learner_id = ? ORDER BY completed_at DESC, id DESC LIMIT ?",
        )
        .bind(learner_id)
        .bind(limit)
        .fetch_all(&self.database)
        .await?;
        rows.into_iter().map(CompletionRecord::try_from).collect()
    }

    pub async fn completion_summary(&self, learner_id: i64) -> Result<CompletionSummary> {
        let rows: Vec<(String, i64, Option<f64>)> = sqlx::query_as(
            "SELECT content_type, COUNT(*), AVG(percentage) FROM completion_record WHERE learner_id = ? GROUP BY content_type",
        )
        .bind(learner_id)
        .fetch_all(&self.database)
        .await?;
        let mut summary = CompletionSummary::default();
        let mut weighted = 0.0;
        for (content_type, count, average) in rows {
            match content_type.parse::<ContentType>() {
                Ok(ContentType::Quiz) => summary.quizzes += count,
                Ok(ContentType::CodingChallenge) => summary.coding_challenges += count,
                Err(_) => {
                    return Err(Error::CorruptRecord(format!(
                        "completion ledger has content type {content_type}"
                    )));
                }
            }
            weighted += average.unwrap_or(0.0) * count as f64;
        }
        let total = summary.quizzes + summary.coding_challenges;
        if total > 0 {
            summary.average_percentage = Some(weighted / total as f64);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    fn completion(learner_id: i64, content_type: ContentType, percentage: i64) -> NewCompletion {
        NewCompletion {
            learner_id,
            content_id: format!("content-{percentage}"),
            content_type,
            score: 4,
            total_questions: 5,
            percentage,
            time_spent: 120,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn count_by_learner_and_type() {
        let (_dir, pool) = test_database().await;
        let ledger = Ledger::new(pool);
        ledger.record_completion(&completion(1, ContentType::Quiz, 80)).await.unwrap();
        ledger.record_completion(&completion(1, ContentType::Quiz, 60)).await.unwrap();
        ledger
            .record_completion(&completion(1, ContentType::CodingChallenge, 100))
            .await
            .unwrap();
        ledger.record_completion(&completion(2, ContentType::Quiz, 90)).await.unwrap();

        assert_eq!(ledger.count_completions(1, &[]).await.unwrap(), 3);
        assert_eq!(ledger.count_completions(1, &ContentType::ALL).await.unwrap(), 3);
        assert_eq!(ledger.count_completions(1, &[ContentType::Quiz]).await.unwrap(), 2);
        assert_eq!(
            ledger.count_completions(1, &[ContentType::CodingChallenge]).await.unwrap(),
            1
        );
        assert_eq!(ledger.count_completions(2, &[]).await.unwrap(), 1);
        assert_eq!(ledger.count_completions(3, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_attempts_each_count() {
        let (_dir, pool) = test_database().await;
        let ledger = Ledger::new(pool);
        let attempt = completion(1, ContentType::Quiz, 50);
        let first = ledger.record_completion(&attempt).await.unwrap();
        let second = ledger.record_completion(&attempt).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(ledger.count_completions(1, &[]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_completion_is_not_written() {
        let (_dir, pool) = test_database().await;
        let ledger = Ledger::new(pool);
        let mut bad = completion(1, ContentType::Quiz, 101);
        assert!(matches!(
            ledger.record_completion(&bad).await,
            Err(Error::InvalidInput(_))
        ));
        bad.percentage = 50;
        bad.content_id = " ".to_string();
        assert!(matches!(
            ledger.record_completion(&bad).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(ledger.count_completions(1, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_and_summary() {
        let (_dir, pool) = test_database().await;
        let ledger = Ledger::new(pool);
        let base = now_utc();
        for (i, percentage) in [40, 60, 80].into_iter().enumerate() {
            let mut c = completion(7, ContentType::Quiz, percentage);
            c.completed_at = Some(base + time::Duration::minutes(i as i64));
            ledger.record_completion(&c).await.unwrap();
        }
        let mut challenge = completion(7, ContentType::CodingChallenge, 100);
        challenge.completed_at = Some(base + time::Duration::minutes(10));
        ledger.record_completion(&challenge).await.unwrap();

        let recent = ledger.recent_completions(7, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content_type, ContentType::CodingChallenge);
        assert_eq!(recent[1].percentage, 80);

        let summary = ledger.completion_summary(7).await.unwrap();
        assert_eq!(summary.quizzes, 3);
        assert_eq!(summary.coding_challenges, 1);
        assert_eq!(summary.average_percentage, Some(70.0));

        let empty = ledger.completion_summary(8).await.unwrap();
        assert_eq!(empty, CompletionSummary::default());
    }

    #[test]
    fn content_type_round_trips_through_text() {
        for content_type in ContentType::ALL {
            assert_eq!(content_type.as_str().parse::<ContentType>().unwrap(), content_type);
        }
        assert!("essay".parse::<ContentType>().is_err());
    }
}
