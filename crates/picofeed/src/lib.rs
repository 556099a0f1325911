//! # Picofeed
//!
//! Signed, append-only feeds small enough to travel inside a URL.
//!
//! ## Overview
//!
//! A feed is a single byte buffer holding a chain of ed25519-signed blocks.
//! Each block carries the signature of the block before it, so any holder
//! can verify the whole chain and extend it without a server:
//!
//! - **Append**: sign a body and link it to the last block
//! - **Pickle**: turn the buffer into URL-safe text and back
//! - **Slice / Truncate**: cut ranges out, or drop the tail
//! - **Diff / Merge**: reconcile two copies, fast-forward only
//!
//! ## Key Concepts
//!
//! - **Block**: immutable once signed. Never edited.
//! - **Genesis**: a block with no parent signature.
//! - **Partial feed**: a fragment whose first block has a parent it lacks.
//! - **Stolen feed**: a feed whose buffer was moved to another feed.
//!
//! ## Usage
//!
//! ```rust
//! use picofeed::{Feed, FeedExt, Keypair};
//!
//! let keypair = Keypair::generate();
//! let mut feed = Feed::new();
//! feed.append_with("Hello World", &keypair).unwrap();
//!
//! let text = feed.pickle().unwrap();
//! assert!(text.starts_with("PIC0."));
//!
//! let mut replica = Feed::new();
//! replica.merge(text.as_str()).unwrap();
//! assert_eq!(replica.get(0).unwrap(), b"Hello World");
//!
//! feed.append_with("</world>", &keypair).unwrap();
//! assert_eq!(replica.diff(&feed).unwrap(), 1);
//! ```
//!
//! ## Re-exports
//!
//! - `picofeed::core` - Codec, blocks, indexer and the feed buffer
//! - `picofeed::sync` - Diff, merge and convergence checks

pub mod error;
pub mod ext;

// Re-export component crates
pub use picofeed_core as core;
pub use picofeed_sync as sync;

pub use error::{PicofeedError, Result};
pub use ext::FeedExt;

// Re-export commonly used types
pub use picofeed_core::{
    Block, Feed, FeedConfig, FeedError, FeedLike, Keypair, MergeDecision, PublicKey, Signature,
    SignedBlock,
};
pub use picofeed_sync::{ChainDigest, Divergence, MergeOptions, MergeOutcome, SyncError};
