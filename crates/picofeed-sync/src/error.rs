//! Error types for the sync module.

use picofeed_core::FeedError;
use thiserror::Error;

/// How two feeds fail to line up.
///
/// These are expected classifications rather than faults: `merge` reports
/// them as [`MergeOutcome::Rejected`](crate::MergeOutcome::Rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Divergence {
    /// Shared ancestor, different blocks after it.
    #[error("feeds diverge at height {self_height} (other: {other_height})")]
    Diverged {
        self_height: usize,
        other_height: usize,
    },

    /// No block of one feed links to the start of the other.
    #[error("feeds are unrelated")]
    Unrelated,
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The feeds do not line up.
    #[error(transparent)]
    Divergence(#[from] Divergence),

    /// A feed operation failed.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
}

impl SyncError {
    /// The divergence, if this error is one.
    pub fn divergence(&self) -> Option<Divergence> {
        match self {
            SyncError::Divergence(divergence) => Some(*divergence),
            SyncError::Feed(_) => None,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
