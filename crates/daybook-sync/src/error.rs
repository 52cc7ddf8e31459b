use thiserror::Error;

use daybook_remote::RemoteError;
use daybook_store::StoreError;

use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Journal engine has shut down")]
    EngineClosed,

    #[error("No identity attached")]
    NotAttached,

    #[error("Operation is only available in guest mode")]
    GuestModeRequired,

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
