use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid date key: {0}")]
    InvalidDateKey(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),
}
