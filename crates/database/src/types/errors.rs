//! Database error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    ConnectionError(String),

    #[error("migration error: {0}")]
    MigrationError(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("query failed: {0}")]
    Query(sqlx::Error),
}

impl DatabaseError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptRow(message.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            Self::UniqueViolation(err.to_string())
        } else {
            Self::Query(err)
        }
    }
}
