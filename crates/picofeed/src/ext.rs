//! Sync operations as methods on [`Feed`].

use picofeed_core::{Block, Feed, FeedLike, MergeDecision};
use picofeed_sync::{self as sync, ChainDigest, MergeOptions, MergeOutcome};

use crate::error::Result;

/// Diff and merge, callable on a feed directly.
pub trait FeedExt {
    /// How far `other` is from this feed. See [`sync::diff`].
    fn diff(&self, other: &Feed) -> Result<isize>;

    /// Merge anything a feed can be built from.
    fn merge<'a>(&mut self, source: impl Into<FeedLike<'a>>) -> Result<MergeOutcome>;

    /// Merge with explicit options.
    fn merge_opts<'a>(
        &mut self,
        source: impl Into<FeedLike<'a>>,
        options: MergeOptions,
    ) -> Result<MergeOutcome>;

    /// Merge, offering each new block to `on_each` before it is committed.
    fn merge_with<'a, F>(
        &mut self,
        source: impl Into<FeedLike<'a>>,
        on_each: F,
    ) -> Result<MergeOutcome>
    where
        F: FnMut(&Block<'_>) -> MergeDecision;

    /// Digest over every block signature. See [`sync::chain_digest`].
    fn digest(&self) -> Result<ChainDigest>;
}

impl FeedExt for Feed {
    fn diff(&self, other: &Feed) -> Result<isize> {
        Ok(sync::diff(self, other)?)
    }

    fn merge<'a>(&mut self, source: impl Into<FeedLike<'a>>) -> Result<MergeOutcome> {
        self.merge_opts(source, MergeOptions::default())
    }

    fn merge_opts<'a>(
        &mut self,
        source: impl Into<FeedLike<'a>>,
        options: MergeOptions,
    ) -> Result<MergeOutcome> {
        let source = source.into();
        tracing::trace!(kind = source.kind(), "merging");
        let outcome = match source {
            FeedLike::Borrowed(feed) => sync::merge(self, feed, options)?,
            other => {
                let feed = Feed::from_like(other)?;
                sync::merge_owned(self, feed, options)?
            }
        };
        Ok(outcome)
    }

    fn merge_with<'a, F>(
        &mut self,
        source: impl Into<FeedLike<'a>>,
        on_each: F,
    ) -> Result<MergeOutcome>
    where
        F: FnMut(&Block<'_>) -> MergeDecision,
    {
        let options = MergeOptions::default();
        let outcome = match source.into() {
            FeedLike::Borrowed(feed) => sync::merge_with(self, feed, options, on_each)?,
            other => {
                let feed = Feed::from_like(other)?;
                sync::merge_with(self, &feed, options, on_each)?
            }
        };
        Ok(outcome)
    }

    fn digest(&self) -> Result<ChainDigest> {
        Ok(sync::chain_digest(self)?)
    }
}
