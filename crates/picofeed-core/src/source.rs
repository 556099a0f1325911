//! Anything a feed can be built from.

use crate::block::{Block, SignedBlock};
use crate::codec::MAGIC;
use crate::error::{FeedError, Result};
use crate::feed::Feed;
use crate::pickle::PICKLE_MARKER;

/// Input accepted by [`Feed::from_like`].
#[derive(Debug)]
pub enum FeedLike<'a> {
    /// An owned feed, used as is.
    Feed(Feed),
    /// A borrowed feed, cloned.
    Borrowed(&'a Feed),
    /// A single block.
    Block(Block<'a>),
    /// Blocks in chain order.
    Blocks(Vec<Block<'a>>),
    /// Detached blocks in chain order.
    Signed(Vec<SignedBlock>),
    /// Wire bytes, or pickle text as bytes.
    Bytes(&'a [u8]),
    /// Pickle text.
    Pickle(&'a str),
}

impl FeedLike<'_> {
    /// Short name of the input kind, for errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedLike::Feed(_) => "feed",
            FeedLike::Borrowed(_) => "borrowed feed",
            FeedLike::Block(_) => "block",
            FeedLike::Blocks(_) => "blocks",
            FeedLike::Signed(_) => "signed blocks",
            FeedLike::Bytes(_) => "bytes",
            FeedLike::Pickle(_) => "pickle",
        }
    }
}

impl From<Feed> for FeedLike<'_> {
    fn from(feed: Feed) -> Self {
        FeedLike::Feed(feed)
    }
}

impl<'a> From<&'a Feed> for FeedLike<'a> {
    fn from(feed: &'a Feed) -> Self {
        FeedLike::Borrowed(feed)
    }
}

impl<'a> From<Block<'a>> for FeedLike<'a> {
    fn from(block: Block<'a>) -> Self {
        FeedLike::Block(block)
    }
}

impl<'a> From<Vec<Block<'a>>> for FeedLike<'a> {
    fn from(blocks: Vec<Block<'a>>) -> Self {
        FeedLike::Blocks(blocks)
    }
}

impl From<Vec<SignedBlock>> for FeedLike<'_> {
    fn from(blocks: Vec<SignedBlock>) -> Self {
        FeedLike::Signed(blocks)
    }
}

impl<'a> From<&'a [u8]> for FeedLike<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        FeedLike::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for FeedLike<'a> {
    fn from(text: &'a str) -> Self {
        FeedLike::Pickle(text)
    }
}

impl Feed {
    /// Build a feed from any supported input.
    ///
    /// Blocks are rebased into a fresh feed, so they must form a chain.
    pub fn from_like<'a>(source: impl Into<FeedLike<'a>>) -> Result<Feed> {
        match source.into() {
            FeedLike::Feed(feed) => Ok(feed),
            FeedLike::Borrowed(feed) => Ok(feed.clone()),
            FeedLike::Block(block) => {
                let mut feed = Feed::new();
                feed.rebase([block])?;
                Ok(feed)
            }
            FeedLike::Blocks(blocks) => {
                let mut feed = Feed::new();
                feed.rebase(blocks)?;
                Ok(feed)
            }
            FeedLike::Signed(blocks) => {
                let views = blocks
                    .iter()
                    .map(SignedBlock::as_block)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut feed = Feed::new();
                feed.rebase(views)?;
                Ok(feed)
            }
            FeedLike::Bytes(bytes) if bytes.starts_with(MAGIC) => Feed::from_bytes(bytes),
            FeedLike::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) if text.contains(PICKLE_MARKER) => Feed::from_pickle(text),
                _ => Err(FeedError::UnsupportedInput { kind: "bytes" }),
            },
            FeedLike::Pickle(text) => Feed::from_pickle(text),
        }
    }
}
