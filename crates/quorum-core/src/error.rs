use quorum_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
    #[error("database error: {0}")]
    Database(DbError),
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => CoreError::NotFound,
            other => CoreError::Database(other),
        }
    }
}
