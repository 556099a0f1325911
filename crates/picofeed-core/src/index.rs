//! Chain indexer: one forward sweep over a feed buffer.
//!
//! The indexer walks segments from a starting offset and records every
//! block that parses, links to its predecessor and verifies against a
//! known author key. It stops quietly at the first segment that does not,
//! so a feed with a damaged or truncated tail still yields its valid
//! prefix. A block that parses but names the wrong parent is a hard error:
//! the bytes claim to be one chain and are not.

use std::collections::HashMap;

use crate::block::Block;
use crate::codec::{
    check_magic, classify, decode_block, decode_key, BlockLayout, SegmentKind, HEADER_SIZE,
    KEY_SEGMENT_SIZE,
};
use crate::crypto::{PublicKey, Signature};
use crate::error::{CodecError, FeedError, Result};

/// Signers already established for known signatures.
///
/// Lets the indexer skip signature checks for blocks that were verified
/// once before, e.g. while being copied from one feed into another.
pub type SignerHints = HashMap<Signature, PublicKey>;

/// Descriptor of one indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Offset of the segment in the feed buffer.
    pub offset: usize,
    pub layout: BlockLayout,
    /// Key the signature verified against.
    pub signer: PublicKey,
}

impl BlockEntry {
    /// Offset just past the segment.
    pub fn end(&self) -> usize {
        self.offset + self.layout.size
    }

    /// View the block inside `buf`.
    pub fn view<'a>(&self, buf: &'a [u8]) -> Block<'a> {
        Block::from_layout(buf, self.offset, self.layout, Some(self.signer))
    }
}

/// Descriptor of one key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    pub offset: usize,
    pub key: PublicKey,
}

/// Derived index of a feed buffer.
///
/// Never authoritative: it can always be rebuilt by indexing from the
/// header. `end` is the offset up to which the buffer has been indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCache {
    pub blocks: Vec<BlockEntry>,
    pub keys: Vec<KeyEntry>,
    pub end: usize,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            keys: Vec::new(),
            end: HEADER_SIZE,
        }
    }
}

impl IndexCache {
    /// Whether the cache lags behind a buffer whose used bytes end at `tail`.
    pub fn is_stale(&self, tail: usize) -> bool {
        self.end != tail
    }

    pub fn last(&self) -> Option<&BlockEntry> {
        self.blocks.last()
    }

    pub fn knows_key(&self, key: &PublicKey) -> bool {
        self.keys.iter().any(|entry| entry.key == *key)
    }

    /// Keep the first `height` blocks and whatever keys precede their end.
    pub(crate) fn truncate_to(&mut self, height: usize) {
        self.blocks.truncate(height);
        self.end = self.blocks.last().map_or(HEADER_SIZE, BlockEntry::end);
        let end = self.end;
        self.keys.retain(|entry| entry.offset < end);
    }
}

/// Why an index sweep ended before the end of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A segment could not be decoded in full.
    Truncated { offset: usize },
    /// A tag byte matched no segment kind. Bricked blocks land here.
    UnknownTag { offset: usize, tag: u8 },
    /// A block's signature matched none of the candidate keys.
    Unverified { offset: usize },
}

impl StopReason {
    pub fn offset(&self) -> usize {
        match self {
            StopReason::Truncated { offset }
            | StopReason::UnknownTag { offset, .. }
            | StopReason::Unverified { offset } => *offset,
        }
    }
}

/// Result of an index sweep.
#[derive(Debug, Clone)]
pub struct Index {
    pub cache: IndexCache,
    /// Set when the sweep stopped short of the input's end.
    pub stopped: Option<StopReason>,
}

/// Single-pass validating indexer.
pub struct Indexer<'a> {
    buf: &'a [u8],
    hints: Option<&'a SignerHints>,
}

impl<'a> Indexer<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, hints: None }
    }

    /// Trust the given signers instead of re-verifying.
    pub fn with_hints(mut self, hints: &'a SignerHints) -> Self {
        self.hints = Some(hints);
        self
    }

    /// Index the whole buffer, starting after the magic header.
    pub fn index(&self) -> Result<Index> {
        check_magic(self.buf)?;
        self.resume(IndexCache::default())
    }

    /// Continue indexing from `cache.end`.
    pub fn resume(&self, mut cache: IndexCache) -> Result<Index> {
        let buf = self.buf;
        let mut pos = cache.end.max(HEADER_SIZE);
        let mut stopped = None;

        while pos < buf.len() {
            let tag = buf[pos];
            let kind = match classify(tag) {
                Some(kind) => kind,
                None => {
                    stopped = Some(StopReason::UnknownTag { offset: pos, tag });
                    break;
                }
            };

            match kind {
                SegmentKind::Key => {
                    let key = match decode_key(buf, pos) {
                        Ok(key) => key,
                        Err(err) => {
                            stopped = Some(soft_stop(err, pos));
                            break;
                        }
                    };
                    if !cache.knows_key(&key) {
                        cache.keys.push(KeyEntry { offset: pos, key });
                    }
                    pos += KEY_SEGMENT_SIZE;
                }
                SegmentKind::Block => {
                    let layout = match decode_block(buf, pos) {
                        Ok(layout) => layout,
                        Err(err) => {
                            stopped = Some(soft_stop(err, pos));
                            break;
                        }
                    };
                    let block = Block::from_layout(buf, pos, layout, None);

                    // 1. Linkage to the previous block
                    if let Some(prev) = cache.last() {
                        let expected = prev.view(buf).signature();
                        if block.parent_signature() != Some(expected) {
                            return Err(FeedError::InvalidParent {
                                height: cache.blocks.len(),
                            });
                        }
                    }

                    // 2. Signer
                    let Some(signer) = self.resolve_signer(&block, &cache) else {
                        stopped = Some(StopReason::Unverified { offset: pos });
                        break;
                    };

                    cache.blocks.push(BlockEntry {
                        offset: pos,
                        layout,
                        signer,
                    });
                    pos += layout.size;
                }
            }
        }

        cache.end = pos;
        if let Some(reason) = &stopped {
            tracing::debug!(
                ?reason,
                indexed = cache.blocks.len(),
                "index stopped before end of buffer"
            );
        }
        Ok(Index { cache, stopped })
    }

    /// Find the key that signed `block`: a trusted hint, then the embedded
    /// key, then known keys with the most recently seen first.
    fn resolve_signer(&self, block: &Block<'_>, cache: &IndexCache) -> Option<PublicKey> {
        let embedded = block.embedded_key();

        if let Some(key) = self.hints.and_then(|hints| hints.get(&block.signature())) {
            if embedded == Some(*key) || cache.knows_key(key) {
                return Some(*key);
            }
        }

        let mut candidate = *block;
        if let Some(key) = embedded {
            if candidate.verify_with(&key).is_ok() {
                return Some(key);
            }
        }

        cache
            .keys
            .iter()
            .rev()
            .map(|entry| entry.key)
            .find(|key| candidate.verify_with(key).is_ok())
    }
}

fn soft_stop(err: CodecError, offset: usize) -> StopReason {
    match err {
        CodecError::UnknownTag { offset, tag } => StopReason::UnknownTag { offset, tag },
        _ => StopReason::Truncated { offset },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BRICK;
    use crate::crypto::Keypair;
    use crate::feed::Feed;

    fn alice() -> Keypair {
        Keypair::from_seed(&[0xa1; 32])
    }

    fn feed_of(bodies: &[&str], keypair: &Keypair) -> Feed {
        let mut feed = Feed::new();
        for body in bodies {
            feed.append_with(body, keypair).unwrap();
        }
        feed
    }

    #[test]
    fn test_index_whole_feed() {
        let feed = feed_of(&["a", "b", "c"], &alice());
        let index = Indexer::new(feed.as_bytes().unwrap()).index().unwrap();

        assert_eq!(index.cache.blocks.len(), 3);
        assert_eq!(index.cache.keys.len(), 1);
        assert_eq!(index.cache.end, feed.as_bytes().unwrap().len());
        assert!(index.stopped.is_none());
    }

    #[test]
    fn test_missing_magic() {
        assert!(matches!(
            Indexer::new(b"nope").index(),
            Err(FeedError::Codec(CodecError::BadMagic))
        ));
    }

    #[test]
    fn test_truncated_tail_is_soft() {
        let feed = feed_of(&["a", "b"], &alice());
        let bytes = feed.as_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 3];

        let index = Indexer::new(cut).index().unwrap();
        assert_eq!(index.cache.blocks.len(), 1);
        assert!(matches!(
            index.stopped,
            Some(StopReason::Truncated { .. })
        ));
        assert_eq!(index.cache.end, index.cache.blocks[0].end());
    }

    #[test]
    fn test_flipped_body_byte_stops_at_block() {
        let feed = feed_of(&["first", "second", "third"], &alice());
        let mut bytes = feed.as_bytes().unwrap().to_vec();
        let second = feed.cache().unwrap().blocks[1];
        let body_at = second.offset + second.layout.body_offset;
        bytes[body_at] ^= 0x20;

        let index = Indexer::new(&bytes).index().unwrap();
        assert_eq!(index.cache.blocks.len(), 1);
        assert_eq!(
            index.stopped,
            Some(StopReason::Unverified {
                offset: second.offset
            })
        );
    }

    #[test]
    fn test_bricked_block_is_unknown_tag() {
        let feed = feed_of(&["a", "b"], &alice());
        let mut bytes = feed.as_bytes().unwrap().to_vec();
        let second = feed.cache().unwrap().blocks[1];
        bytes[second.offset] = BRICK;

        let index = Indexer::new(&bytes).index().unwrap();
        assert_eq!(index.cache.blocks.len(), 1);
        assert_eq!(
            index.stopped,
            Some(StopReason::UnknownTag {
                offset: second.offset,
                tag: BRICK
            })
        );
    }

    #[test]
    fn test_wrong_parent_is_hard_error() {
        let keypair = alice();
        let a = feed_of(&["a", "b"], &keypair);
        let b = feed_of(&["x", "y"], &keypair);

        // Splice b's second block after a's blocks.
        let mut bytes = a.as_bytes().unwrap().to_vec();
        let foreign = b.cache().unwrap().blocks[1];
        let b_bytes = b.as_bytes().unwrap();
        bytes.extend_from_slice(&b_bytes[foreign.offset..foreign.end()]);

        assert!(matches!(
            Indexer::new(&bytes).index(),
            Err(FeedError::InvalidParent { height: 2 })
        ));
    }

    #[test]
    fn test_genesis_after_block_is_hard_error() {
        let keypair = alice();
        let a = feed_of(&["a"], &keypair);
        let b = feed_of(&["x"], &keypair);

        let mut bytes = a.as_bytes().unwrap().to_vec();
        let genesis = b.cache().unwrap().blocks[0];
        bytes.extend_from_slice(&b.as_bytes().unwrap()[genesis.offset..genesis.end()]);

        assert!(matches!(
            Indexer::new(&bytes).index(),
            Err(FeedError::InvalidParent { height: 1 })
        ));
    }

    #[test]
    fn test_resume_matches_full_index() {
        let keypair = alice();
        let mut feed = feed_of(&["a", "b"], &keypair);
        let partial = Indexer::new(feed.as_bytes().unwrap()).index().unwrap();

        feed.append_with("c", &keypair).unwrap();
        let bytes = feed.as_bytes().unwrap();
        let resumed = Indexer::new(bytes).resume(partial.cache).unwrap();
        let full = Indexer::new(bytes).index().unwrap();

        // Tags differ only in the end-of-chain hint, which the append moved.
        let offsets = |cache: &IndexCache| -> Vec<usize> {
            cache.blocks.iter().map(|entry| entry.offset).collect()
        };
        assert_eq!(offsets(&resumed.cache), offsets(&full.cache));
        assert_eq!(resumed.cache.keys, full.cache.keys);
        assert_eq!(resumed.cache.end, full.cache.end);
    }

    #[test]
    fn test_multiple_authors_resolve() {
        let alice = alice();
        let bob = Keypair::from_seed(&[0xb0; 32]);
        let mut feed = Feed::new();
        feed.append_with("a1", &alice).unwrap();
        feed.append_with("b1", &bob).unwrap();
        feed.append_with("a2", &alice).unwrap();

        let index = Indexer::new(feed.as_bytes().unwrap()).index().unwrap();
        let signers: Vec<_> = index.cache.blocks.iter().map(|b| b.signer).collect();
        assert_eq!(
            signers,
            vec![alice.public_key(), bob.public_key(), alice.public_key()]
        );
        assert_eq!(index.cache.keys.len(), 2);
    }

    #[test]
    fn test_hint_for_unknown_key_is_ignored() {
        let keypair = alice();
        let feed = feed_of(&["a"], &keypair);
        let bytes = feed.as_bytes().unwrap();
        let sig = feed.last().unwrap().unwrap().signature();

        let stranger = Keypair::from_seed(&[0x55; 32]).public_key();
        let mut hints = SignerHints::new();
        hints.insert(sig, stranger);

        let index = Indexer::new(bytes).with_hints(&hints).index().unwrap();
        assert_eq!(index.cache.blocks[0].signer, keypair.public_key());
    }
}
