//! Database error types.

use derive_more::{Display, Error};
use diesel::result::DatabaseErrorKind;
use tracing::instrument;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DbErrorKind {
    /// A `UNIQUE` constraint rejected the write.
    #[display("duplicate")]
    Duplicate,
    /// Anything else: connection, query, migration or task failure.
    #[display("storage")]
    Storage,
}

/// Database error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Database error ({}): {} at {}:{}", kind, message, file, line)]
pub struct DbError {
    /// Classification.
    pub kind: DbErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates a storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Storage, message)
    }

    #[track_caller]
    fn with_kind(kind: DbErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// True when a uniqueness constraint refused the write.
    pub fn is_duplicate(&self) -> bool {
        self.kind == DbErrorKind::Duplicate
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        let kind = match &err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                DbErrorKind::Duplicate
            }
            _ => DbErrorKind::Storage,
        };
        Self::with_kind(kind, format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Connection error: {}", err))
    }
}

impl From<tokio::task::JoinError> for DbError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(format!("Blocking database task failed: {}", err))
    }
}
