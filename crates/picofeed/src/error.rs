//! Error types for the unified API.

use picofeed_core::FeedError;
use picofeed_sync::{Divergence, SyncError};
use thiserror::Error;

/// Errors that can occur through [`FeedExt`](crate::FeedExt).
#[derive(Debug, Error)]
pub enum PicofeedError {
    /// Feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl PicofeedError {
    /// The divergence behind this error, if any.
    pub fn divergence(&self) -> Option<Divergence> {
        match self {
            PicofeedError::Sync(err) => err.divergence(),
            PicofeedError::Feed(_) => None,
        }
    }

    /// Whether the error came from a feed whose buffer was taken.
    pub fn is_stolen(&self) -> bool {
        matches!(
            self,
            PicofeedError::Feed(FeedError::Stolen)
                | PicofeedError::Sync(SyncError::Feed(FeedError::Stolen))
        )
    }
}

/// Result type for the unified API.
pub type Result<T> = std::result::Result<T, PicofeedError>;
