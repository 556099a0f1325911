//! # Picofeed Testkit
//!
//! Testing utilities for Picofeed.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known feeds with expected wire sizes and head
//!   signatures, for cross-implementation checks
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Deterministic authors and pre-built feeds
//!
//! ## Golden Vectors
//!
//! ```rust
//! use picofeed_testkit::vectors::{all_vectors, feed_from_vector};
//!
//! for vector in all_vectors() {
//!     let feed = feed_from_vector(&vector);
//!     println!("{}: {} bytes", vector.name, feed.tail());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use picofeed_testkit::generators::{FeedParams, feed_from_params};
//!
//! proptest! {
//!     #[test]
//!     fn wire_bytes_reload(params: FeedParams) {
//!         let feed = feed_from_params(&params);
//!         let reloaded = picofeed_core::Feed::from_bytes(feed.as_bytes().unwrap()).unwrap();
//!         prop_assert_eq!(reloaded.len(), feed.len());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use picofeed_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::with_seed([7; 32]);
//! let feed = fixture.feed(&["B0", "B1"]);
//! assert_eq!(feed.len(), 2);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, TestFixture};
pub use generators::{feed_from_params, FeedParams};
pub use vectors::{all_vectors, feed_from_vector, verify_all_vectors, GoldenVector};
