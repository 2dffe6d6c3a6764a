use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Related records are write-once; the token already has some.
    #[error("token \"{token}\" already contains related records")]
    PreconditionViolation { token: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("token has not been stored yet")]
    Unsaved,
}
