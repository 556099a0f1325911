//! # Picofeed Core
//!
//! Primitives for Picofeed: an append-only, self-verifying log packed into
//! a single byte buffer.
//!
//! This crate contains no I/O, no storage, no networking. Everything is
//! computation over signed byte ranges.
//!
//! ## Key Types
//!
//! - [`Feed`] - The log: a byte arena plus its derived index
//! - [`Block`] - Zero-copy view of one signed block
//! - [`SignedBlock`] - A block detached from its feed
//! - [`Indexer`] - Single-pass validating sweep over feed bytes
//! - [`FeedLike`] - Every input a feed can be built from
//!
//! ## Wire Format
//!
//! Feeds are a magic header followed by key and block segments. See the
//! [`codec`] module for the layout and [`pickle`] for the text transport.

pub mod block;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod feed;
pub mod index;
pub mod pickle;
pub mod source;

pub use block::{Block, SignedBlock};
pub use codec::{BlockHeader, BlockLayout, MAGIC};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{CodecError, FeedError, Result};
pub use feed::{Blocks, Feed, FeedConfig, MergeDecision};
pub use index::{Index, IndexCache, Indexer, SignerHints, StopReason};
pub use source::FeedLike;
