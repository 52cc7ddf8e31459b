use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Document or blob does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure; the operation may succeed if repeated.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend refused the operation (permissions, quota, validation).
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    /// URL scheme this client cannot fetch.
    #[error("Unsupported URL: {0}")]
    Unsupported(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
