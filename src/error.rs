use sqlx::error::ErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ledger or path store could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(sqlx::Error),
    #[error("No curriculum path for learner {learner_id}")]
    CurriculumNotFound { learner_id: i64 },
    /// Recovered by the parser's fallback policy, never returned from the tracker.
    #[error("Malformed curriculum document: {0}")]
    MalformedCurriculumDocument(String),
    #[error("Concurrent update conflict for learner {learner_id}, gave up after {attempts} attempts")]
    ConcurrentUpdateConflict { learner_id: i64, attempts: u32 },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    #[error("Fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

/// Rows that cannot be decoded are corrupt and constraint violations are bad
/// input; only the rest means the store itself is unavailable.
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let constraint = match &e {
            sqlx::Error::Database(db) => matches!(
                db.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ),
            _ => false,
        };
        match e {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. } => Error::CorruptRecord(e.to_string()),
            sqlx::Error::Database(db) if constraint => Error::InvalidInput(db.message().to_string()),
            e => Error::StorageUnavailable(e),
        }
    }
}
