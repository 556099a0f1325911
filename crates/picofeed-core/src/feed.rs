//! The feed: an append-only chain of signed blocks in one byte arena.
//!
//! A `Feed` owns its buffer and an [`IndexCache`] derived from it. Every
//! mutator leaves the cache in step with the buffer, so read accessors
//! take `&self` and never re-index.

use std::fmt;

use crate::block::Block;
use crate::codec::{
    encode_block, encode_key, tag, BlockHeader, BRICK, HEADER_SIZE, KEY_SEGMENT_SIZE, MAGIC,
};
use crate::crypto::{Keypair, PublicKey};
use crate::error::{FeedError, Result};
use crate::index::{BlockEntry, IndexCache, Indexer, KeyEntry, SignerHints, StopReason};
use crate::pickle;

/// Initial arena size of a new feed.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Default upper bound on a feed's arena.
pub const DEFAULT_MAX_SIZE: usize = 64 * 1024;

/// Feed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Arena size allocated up front.
    pub initial_capacity: usize,

    /// Hard limit on the arena. `None` lets the feed grow without bound.
    pub max_size: Option<usize>,

    /// Embed the author key in each appended block instead of writing
    /// key segments.
    pub embed_author: bool,

    /// Maintain the end-of-chain hint on the last block.
    pub end_of_chain_hint: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_size: Some(DEFAULT_MAX_SIZE),
            embed_author: false,
            end_of_chain_hint: true,
        }
    }
}

/// What to do after a block has been offered to a rebase callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Accept the block and keep going.
    Continue,
    /// Accept the block, then stop.
    StopKeepCurrent,
    /// Reject the block and stop.
    StopDiscardCurrent,
}

// ─────────────────────────────────────────────────────────────────────────
// Arena
// ─────────────────────────────────────────────────────────────────────────

/// The byte buffer plus its derived index.
///
/// `buf.len()` is the capacity; bytes past `tail` are unused.
#[derive(Clone)]
struct Arena {
    buf: Vec<u8>,
    tail: usize,
    cache: IndexCache,
}

impl Arena {
    fn new(capacity: usize) -> Self {
        let mut buf = vec![0u8; capacity.max(HEADER_SIZE)];
        buf[..HEADER_SIZE].copy_from_slice(MAGIC);
        Self {
            buf,
            tail: HEADER_SIZE,
            cache: IndexCache::default(),
        }
    }

    /// Build an arena over already indexed bytes.
    fn from_indexed(bytes: &[u8], cache: IndexCache, capacity: usize) -> Self {
        let tail = cache.end;
        let mut buf = vec![0u8; capacity.max(tail)];
        buf[..tail].copy_from_slice(&bytes[..tail]);
        Self { buf, tail, cache }
    }

    fn used(&self) -> &[u8] {
        &self.buf[..self.tail]
    }

    /// Make room for `additional` bytes past `tail`.
    fn reserve(&mut self, additional: usize, max_size: Option<usize>) -> Result<()> {
        let required = self.tail + additional;
        if let Some(max) = max_size {
            if required > max {
                return Err(FeedError::FeedOverflow {
                    required: additional,
                    available: max.saturating_sub(self.tail),
                });
            }
        }
        if required <= self.buf.len() {
            return Ok(());
        }

        let mut capacity = (self.buf.len() * 2).max(required);
        if let Some(max) = max_size {
            capacity = capacity.min(max);
        }
        tracing::trace!(from = self.buf.len(), to = capacity, "growing feed arena");
        self.buf.resize(capacity, 0);
        Ok(())
    }

    /// Write a key segment at `tail`. Room must be reserved.
    fn push_key(&mut self, key: &PublicKey) -> Result<usize> {
        let offset = self.tail;
        self.tail += encode_key(&mut self.buf[offset..], key)?;
        Ok(offset)
    }

    /// Copy a raw segment to `tail`. Room must be reserved.
    fn push_segment(&mut self, segment: &[u8]) -> usize {
        let offset = self.tail;
        self.buf[offset..offset + segment.len()].copy_from_slice(segment);
        self.tail += segment.len();
        offset
    }

    /// Flip the end-of-chain hint of the block at `offset`.
    fn set_end_of_chain(&mut self, offset: usize, on: bool) {
        if on {
            self.buf[offset] |= tag::END_OF_CHAIN;
        } else {
            self.buf[offset] &= !tag::END_OF_CHAIN;
        }
        let value = self.buf[offset];
        if let Some(entry) = self.cache.blocks.iter_mut().rev().find(|e| e.offset == offset) {
            entry.layout.tag = value;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Feed
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum FeedState {
    Live(Arena),
    /// The arena was moved into another feed.
    Stolen,
}

/// An append-only, self-verifying log.
#[derive(Clone)]
pub struct Feed {
    state: FeedState,
    config: FeedConfig,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed {
    /// Create an empty feed with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FeedConfig::default())
    }

    /// Create an empty feed.
    pub fn with_config(config: FeedConfig) -> Self {
        Self {
            state: FeedState::Live(Arena::new(config.initial_capacity)),
            config,
        }
    }

    /// Reconstruct a feed from wire bytes, verifying every block.
    ///
    /// Indexing stops at the first segment that fails to decode or verify;
    /// the feed then holds the valid prefix. A block that does not link to
    /// its predecessor is an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with(bytes, FeedConfig::default(), None)
    }

    /// Reconstruct a feed, trusting `hints` for signers already verified.
    pub fn from_bytes_trusted(bytes: &[u8], hints: &SignerHints) -> Result<Self> {
        Self::from_bytes_with(bytes, FeedConfig::default(), Some(hints))
    }

    pub fn from_bytes_with(
        bytes: &[u8],
        config: FeedConfig,
        hints: Option<&SignerHints>,
    ) -> Result<Self> {
        let mut indexer = Indexer::new(bytes);
        if let Some(hints) = hints {
            indexer = indexer.with_hints(hints);
        }
        let index = indexer.index()?;
        let arena = Arena::from_indexed(bytes, index.cache, config.initial_capacity);
        Ok(Self {
            state: FeedState::Live(arena),
            config,
        })
    }

    /// Decode a pickled feed.
    pub fn from_pickle(text: &str) -> Result<Self> {
        let bytes = pickle::decode(text)?;
        Self::from_bytes(&bytes)
    }

    /// Encode the feed as URL-safe text.
    pub fn pickle(&self) -> Result<String> {
        pickle::encode(self.as_bytes()?)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn arena(&self) -> Result<&Arena> {
        match &self.state {
            FeedState::Live(arena) => Ok(arena),
            FeedState::Stolen => Err(FeedError::Stolen),
        }
    }

    fn arena_mut(&mut self) -> Result<&mut Arena> {
        match &mut self.state {
            FeedState::Live(arena) => Ok(arena),
            FeedState::Stolen => Err(FeedError::Stolen),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Number of indexed blocks. A stolen feed reads as empty.
    pub fn len(&self) -> usize {
        self.arena().map_or(0, |arena| arena.cache.blocks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the first block is not a genesis block.
    pub fn is_partial(&self) -> bool {
        self.arena()
            .ok()
            .and_then(|arena| arena.cache.blocks.first())
            .map_or(false, |entry| entry.layout.has_parent())
    }

    pub fn is_stolen(&self) -> bool {
        matches!(self.state, FeedState::Stolen)
    }

    /// End of used bytes.
    pub fn tail(&self) -> usize {
        self.arena().map_or(0, |arena| arena.tail)
    }

    /// Current arena size.
    pub fn capacity(&self) -> usize {
        self.arena().map_or(0, |arena| arena.buf.len())
    }

    /// The wire bytes: magic header and every indexed segment.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        Ok(self.arena()?.used())
    }

    pub fn cache(&self) -> Result<&IndexCache> {
        Ok(&self.arena()?.cache)
    }

    /// Iterate over the blocks in chain order.
    pub fn blocks(&self) -> Result<Blocks<'_>> {
        let arena = self.arena()?;
        Ok(Blocks {
            buf: arena.used(),
            entries: arena.cache.blocks.iter(),
        })
    }

    /// The block at `height`.
    pub fn block(&self, height: usize) -> Result<Block<'_>> {
        let arena = self.arena()?;
        arena
            .cache
            .blocks
            .get(height)
            .map(|entry| entry.view(arena.used()))
            .ok_or(FeedError::BlockNotFound { height })
    }

    /// The body of the block at `height`.
    pub fn get(&self, height: usize) -> Result<&[u8]> {
        Ok(self.block(height)?.body())
    }

    pub fn first(&self) -> Result<Option<Block<'_>>> {
        Ok(self.blocks()?.next())
    }

    pub fn last(&self) -> Result<Option<Block<'_>>> {
        Ok(self.blocks()?.next_back())
    }

    /// Distinct author keys held in key segments, in order of appearance.
    pub fn keys(&self) -> Result<Vec<PublicKey>> {
        Ok(self.arena()?.cache.keys.iter().map(|entry| entry.key).collect())
    }

    /// Bring the cache in line with `tail`.
    ///
    /// Mutators keep the cache fresh, so this only does work after the
    /// cache was dropped or lags behind. Returns why indexing stopped, if
    /// it stopped early.
    pub fn refresh(&mut self) -> Result<Option<StopReason>> {
        let arena = self.arena_mut()?;
        if !arena.cache.is_stale(arena.tail) {
            return Ok(None);
        }

        let indexer = Indexer::new(arena.used());
        let index = if arena.cache.end < arena.tail {
            indexer.resume(arena.cache.clone())?
        } else {
            indexer.index()?
        };
        arena.tail = index.cache.end;
        arena.cache = index.cache;
        Ok(index.stopped)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutators
    // ─────────────────────────────────────────────────────────────────────

    /// Sign and append a block. `secret` is a 32-byte seed or the 64-byte
    /// `seed || public key` form.
    ///
    /// Returns the new block count.
    pub fn append(&mut self, data: impl AsRef<[u8]>, secret: &[u8]) -> Result<usize> {
        let keypair = Keypair::from_secret(secret)?;
        self.append_with(data, &keypair)
    }

    /// Sign and append a block with `keypair`.
    pub fn append_with(&mut self, data: impl AsRef<[u8]>, keypair: &Keypair) -> Result<usize> {
        let body = data.as_ref();
        if body.is_empty() {
            return Err(FeedError::EmptyBody);
        }

        let Feed { state, config } = self;
        let arena = match state {
            FeedState::Live(arena) => arena,
            FeedState::Stolen => return Err(FeedError::Stolen),
        };

        let key = keypair.public_key();
        let needs_key = !config.embed_author && !arena.cache.knows_key(&key);
        let prev = arena.cache.last().copied();

        let header = BlockHeader {
            parent: prev.map(|entry| entry.view(&arena.buf).signature()),
            author: config.embed_author.then_some(key),
            end_of_chain: config.end_of_chain_hint,
        };
        let block_size = header.size_for(body.len());
        let key_size = if needs_key { KEY_SEGMENT_SIZE } else { 0 };

        // Nothing is written unless the whole block fits.
        arena.reserve(key_size + block_size, config.max_size)?;

        if needs_key {
            let offset = arena.push_key(&key)?;
            arena.cache.keys.push(KeyEntry { offset, key });
        }
        if let Some(prev) = prev {
            arena.set_end_of_chain(prev.offset, false);
        }

        let offset = arena.tail;
        let segment = &mut arena.buf[offset..offset + block_size];
        let layout = encode_block(segment, &header, body)?;
        let signature = keypair.sign(&segment[layout.signed_range()]);
        segment[layout.signature_range()].copy_from_slice(signature.as_bytes());

        arena.tail += layout.size;
        arena.cache.blocks.push(BlockEntry {
            offset,
            layout,
            signer: key,
        });
        arena.cache.end = arena.tail;
        Ok(arena.cache.blocks.len())
    }

    /// Drop every block at or above `height`. A negative height counts
    /// from the end.
    ///
    /// Dropped blocks are bricked so they never index again. Returns
    /// whether anything was removed.
    pub fn truncate(&mut self, height: isize) -> Result<bool> {
        let end_of_chain_hint = self.config.end_of_chain_hint;
        let arena = self.arena_mut()?;
        let len = arena.cache.blocks.len();
        let keep = resolve_index(height, len);
        if keep >= len {
            return Ok(false);
        }

        for entry in &arena.cache.blocks[keep..] {
            arena.buf[entry.offset] = BRICK;
        }
        arena.cache.truncate_to(keep);
        arena.tail = arena.cache.end;

        if let Some(last) = arena.cache.last().copied() {
            arena.set_end_of_chain(last.offset, end_of_chain_hint);
        }
        tracing::trace!(from = len, to = keep, "truncated feed");
        Ok(true)
    }

    /// Copy blocks `[start, end)` into a new feed. Negative indices count
    /// from the end; `None` runs to the end.
    ///
    /// The new feed holds exactly the key segments its blocks need, written
    /// ahead of the blocks in order of first use.
    pub fn slice(&self, start: isize, end: Option<isize>) -> Result<Feed> {
        let arena = self.arena()?;
        let len = arena.cache.blocks.len();
        let start = resolve_index(start, len);
        let end = end.map_or(len, |end| resolve_index(end, len));
        let entries = if start < end {
            &arena.cache.blocks[start..end]
        } else {
            &[][..]
        };

        let mut keys: Vec<PublicKey> = Vec::new();
        for entry in entries {
            if !entry.layout.embeds_author() && !keys.contains(&entry.signer) {
                keys.push(entry.signer);
            }
        }

        let mut hints = SignerHints::new();
        let mut out = Arena::new(self.config.initial_capacity);
        let total = keys.len() * KEY_SEGMENT_SIZE
            + entries.iter().map(|entry| entry.layout.size).sum::<usize>();
        out.reserve(total, self.config.max_size)?;

        for key in &keys {
            out.push_key(key)?;
        }
        let mut last = None;
        for entry in entries {
            let block = entry.view(arena.used());
            hints.insert(block.signature(), entry.signer);
            let offset = out.push_segment(block.as_bytes());
            out.set_end_of_chain(offset, false);
            last = Some(offset);
        }
        if let Some(offset) = last {
            out.set_end_of_chain(offset, self.config.end_of_chain_hint);
        }

        let index = Indexer::new(out.used()).with_hints(&hints).index()?;
        out.tail = index.cache.end;
        out.cache = index.cache;
        Ok(Feed {
            state: FeedState::Live(out),
            config: self.config.clone(),
        })
    }

    /// Append already signed blocks, keeping their signatures.
    ///
    /// The first block must link to this feed's last block, unless the feed
    /// is empty. Returns the number of blocks that validated.
    pub fn rebase<'b, I>(&mut self, blocks: I) -> Result<usize>
    where
        I: IntoIterator<Item = Block<'b>>,
    {
        self.rebase_with(blocks, |_| MergeDecision::Continue)
    }

    /// Like [`Feed::rebase`], offering each block to `on_each` first.
    pub fn rebase_with<'b, I, F>(&mut self, blocks: I, mut on_each: F) -> Result<usize>
    where
        I: IntoIterator<Item = Block<'b>>,
        F: FnMut(&Block<'b>) -> MergeDecision,
    {
        let Feed { state, config } = self;
        let arena = match state {
            FeedState::Live(arena) => arena,
            FeedState::Stolen => return Err(FeedError::Stolen),
        };

        let old_tail = arena.tail;
        let old_len = arena.cache.blocks.len();
        let old_last = arena.cache.last().copied();

        let mut hints = SignerHints::new();
        let mut added_keys: Vec<PublicKey> = Vec::new();
        let mut last_offset = old_last.map(|entry| entry.offset);

        let copied = (|| -> Result<()> {
            for block in blocks {
                let decision = on_each(&block);
                if decision == MergeDecision::StopDiscardCurrent {
                    break;
                }

                // A detached block can name any signer; only a verified one
                // becomes a hint.
                let signer = block.author_key().ok_or(FeedError::NoSigner)?;
                block.verify()?;
                let needs_key = !block.layout().embeds_author()
                    && !arena.cache.knows_key(&signer)
                    && !added_keys.contains(&signer);
                let key_size = if needs_key { KEY_SEGMENT_SIZE } else { 0 };
                arena.reserve(key_size + block.size(), config.max_size)?;

                if needs_key {
                    arena.push_key(&signer)?;
                    added_keys.push(signer);
                }
                if let Some(offset) = last_offset {
                    arena.set_end_of_chain(offset, false);
                }
                let offset = arena.push_segment(block.as_bytes());
                arena.set_end_of_chain(offset, config.end_of_chain_hint);
                last_offset = Some(offset);
                hints.insert(block.signature(), signer);

                if decision == MergeDecision::StopKeepCurrent {
                    break;
                }
            }
            Ok(())
        })();

        // Whatever was copied is validated before it becomes part of the feed.
        let indexed = Indexer::new(arena.used())
            .with_hints(&hints)
            .resume(arena.cache.clone());

        let index = match (copied, indexed) {
            (Ok(()), Ok(index)) => index,
            (Err(err), _) | (_, Err(err)) => {
                arena.tail = old_tail;
                if let Some(last) = old_last {
                    arena.set_end_of_chain(last.offset, config.end_of_chain_hint);
                }
                return Err(err);
            }
        };

        if let Some(reason) = index.stopped {
            tracing::warn!(?reason, "rebase kept only a validated prefix");
        }
        arena.tail = index.cache.end;
        arena.cache = index.cache;
        Ok(arena.cache.blocks.len() - old_len)
    }

    /// Move this feed's arena into a new feed, leaving `self` stolen.
    pub fn take(&mut self) -> Result<Feed> {
        match std::mem::replace(&mut self.state, FeedState::Stolen) {
            FeedState::Live(arena) => Ok(Feed {
                state: FeedState::Live(arena),
                config: self.config.clone(),
            }),
            FeedState::Stolen => Err(FeedError::Stolen),
        }
    }

    /// Replace this feed's contents with `donor`'s arena.
    ///
    /// The arena must fit this feed's `max_size`. Key segments this feed
    /// held are replaced along with its blocks.
    pub fn adopt(&mut self, donor: Feed) -> Result<()> {
        self.arena()?;
        match donor.state {
            FeedState::Live(arena) => {
                if let Some(max) = self.config.max_size {
                    if arena.tail > max {
                        return Err(FeedError::FeedOverflow {
                            required: arena.tail,
                            available: max,
                        });
                    }
                }
                self.state = FeedState::Live(arena);
                Ok(())
            }
            FeedState::Stolen => Err(FeedError::Stolen),
        }
    }
}

/// Clamp a possibly negative index into `0..=len`.
fn resolve_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            FeedState::Live(arena) => f
                .debug_struct("Feed")
                .field("blocks", &arena.cache.blocks.len())
                .field("keys", &arena.cache.keys.len())
                .field("tail", &arena.tail)
                .field("capacity", &arena.buf.len())
                .finish(),
            FeedState::Stolen => f.write_str("Feed(stolen)"),
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = match &self.state {
            FeedState::Live(arena) => arena,
            FeedState::Stolen => return f.write_str("<stolen feed>"),
        };
        writeln!(
            f,
            "Feed: {} blocks, {} keys, {} bytes{}",
            arena.cache.blocks.len(),
            arena.cache.keys.len(),
            arena.tail,
            if self.is_partial() { " (partial)" } else { "" }
        )?;
        for (height, entry) in arena.cache.blocks.iter().enumerate() {
            let block = entry.view(arena.used());
            writeln!(
                f,
                "  [{height}] {} by {} ({} bytes)",
                block.signature(),
                entry.signer,
                block.body().len()
            )?;
        }
        Ok(())
    }
}

/// Iterator over a feed's blocks.
#[derive(Clone)]
pub struct Blocks<'a> {
    buf: &'a [u8],
    entries: std::slice::Iter<'a, BlockEntry>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Block<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| entry.view(self.buf))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl DoubleEndedIterator for Blocks<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.entries.next_back().map(|entry| entry.view(self.buf))
    }
}

impl ExactSizeIterator for Blocks<'_> {}
