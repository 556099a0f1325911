//! # Picofeed Sync
//!
//! Reconciliation of two feeds without a central authority.
//!
//! ## Overview
//!
//! - [`diff`] tells how far apart two feeds are, or that they diverged or
//!   share no alignment point.
//! - [`merge`] appends the blocks one feed has beyond another, byte for
//!   byte, re-validating them on arrival.
//! - [`verify_convergence`] checks two holders ended up with the same chain.
//!
//! ## Relationships
//!
//! ```text
//! ours:   B0 B1                  diff = +2   (other is ahead)
//! other:  B0 B1 B2 B3
//!
//! ours:   B0 B1 B2               diff = -1   (other is behind)
//! other:  B0 B1
//!
//! ours:   B0 B1 X2               Diverged
//! other:  B0 B1 Y2
//!
//! ours:         B2 B3            Unrelated, merged in reverse
//! other:  B0 B1
//! ```

pub mod convergence;
pub mod diff;
pub mod error;
pub mod merge;

pub use convergence::{chain_digest, verify_convergence, ChainDigest, ConvergenceResult};
pub use diff::diff;
pub use error::{Divergence, Result, SyncError};
pub use merge::{merge, merge_owned, merge_with, MergeOptions, MergeOutcome};
pub use picofeed_core::MergeDecision;
