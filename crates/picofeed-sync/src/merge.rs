//! Merge: extend one feed with the blocks another feed has beyond it.
//!
//! Merging never rewrites history. Blocks are copied byte for byte onto
//! the destination's tail and re-indexed there, so a merge only ever
//! fast-forwards. Diverged or unrelated feeds are rejected, with one
//! exception: when the destination is a fragment the merge is tried in
//! reverse, extending a copy of the source with the destination's blocks.

use std::collections::HashSet;

use picofeed_core::{Block, Feed, MergeDecision, Signature};
use serde::{Deserialize, Serialize};

use crate::diff::diff;
use crate::error::{Divergence, Result, SyncError};

/// Merge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Never take over a source feed's arena; always copy.
    pub force_copy: bool,

    /// How many times a merge may flip direction to place a fragment.
    pub max_reversals: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            force_copy: false,
            max_reversals: 1,
        }
    }
}

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The destination grew by this many blocks.
    Merged(usize),
    /// The feeds do not line up; the destination is unchanged.
    Rejected(Divergence),
}

impl MergeOutcome {
    /// Blocks merged, or `-1` for a rejected merge.
    pub fn count(&self) -> isize {
        match self {
            MergeOutcome::Merged(count) => *count as isize,
            MergeOutcome::Rejected(_) => -1,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MergeOutcome::Rejected(_))
    }
}

/// Per-block merge callback.
type OnEach<'f> = &'f mut dyn FnMut(&Block<'_>) -> MergeDecision;

/// Where the blocks come from.
enum Source<'a> {
    Borrowed(&'a Feed),
    Owned(Feed),
}

impl Source<'_> {
    fn feed(&self) -> &Feed {
        match self {
            Source::Borrowed(feed) => feed,
            Source::Owned(feed) => feed,
        }
    }

    /// An owned feed with the source's contents, taken over if allowed.
    fn into_owned(self, force_copy: bool) -> Feed {
        match self {
            Source::Owned(feed) if !force_copy => feed,
            Source::Owned(feed) => feed.clone(),
            Source::Borrowed(feed) => feed.clone(),
        }
    }
}

/// Merge `source` into `destination`.
pub fn merge(destination: &mut Feed, source: &Feed, options: MergeOptions) -> Result<MergeOutcome> {
    merge_inner(
        destination,
        Source::Borrowed(source),
        options,
        options.max_reversals,
        None,
    )
}

/// Merge `source` into `destination`, offering each block to `on_each`
/// before it is committed.
pub fn merge_with<F>(
    destination: &mut Feed,
    source: &Feed,
    options: MergeOptions,
    mut on_each: F,
) -> Result<MergeOutcome>
where
    F: FnMut(&Block<'_>) -> MergeDecision,
{
    let callback: OnEach<'_> = &mut on_each;
    merge_inner(
        destination,
        Source::Borrowed(source),
        options,
        options.max_reversals,
        Some(callback),
    )
}

/// Merge an owned `source` into `destination`.
///
/// When the destination is empty, holds no key segments and has room for
/// the source, its arena is replaced by the source's without copying,
/// unless `force_copy` is set. Otherwise the blocks are rebased. Pass `feed.take()?` to
/// hand over a feed you hold by reference; it is left stolen.
pub fn merge_owned(
    destination: &mut Feed,
    source: Feed,
    options: MergeOptions,
) -> Result<MergeOutcome> {
    merge_inner(
        destination,
        Source::Owned(source),
        options,
        options.max_reversals,
        None,
    )
}

fn merge_inner(
    destination: &mut Feed,
    source: Source<'_>,
    options: MergeOptions,
    reversals_left: u32,
    on_each: Option<OnEach<'_>>,
) -> Result<MergeOutcome> {
    // 1. Both feeds must be live
    destination.as_bytes()?;
    source.feed().as_bytes()?;

    // 2. Nothing to take
    if source.feed().is_empty() {
        return Ok(MergeOutcome::Merged(0));
    }

    // 3. Empty destination takes the whole source
    if destination.is_empty() && on_each.is_none() && can_adopt(destination, source.feed())? {
        let donor = source.into_owned(options.force_copy);
        let count = donor.len();
        destination.adopt(donor)?;
        return Ok(MergeOutcome::Merged(count));
    }

    // 4. Line the feeds up
    let shift = match diff(destination, source.feed()) {
        Ok(shift) => shift,
        Err(SyncError::Divergence(Divergence::Unrelated))
            if destination.is_partial() && reversals_left > 0 =>
        {
            return reverse_merge(destination, source, options, reversals_left - 1, on_each);
        }
        Err(SyncError::Divergence(divergence)) => {
            tracing::debug!(%divergence, "merge rejected");
            return Ok(MergeOutcome::Rejected(divergence));
        }
        Err(err) => return Err(err),
    };

    if shift <= 0 {
        return Ok(MergeOutcome::Merged(0));
    }

    // 5. Rebase the new blocks
    let feed = source.feed();
    let skip = feed.len() - shift.unsigned_abs();
    let blocks = feed.blocks()?.skip(skip);
    let count = match on_each {
        Some(callback) => destination.rebase_with(blocks, |block| callback(block))?,
        None => destination.rebase(blocks)?,
    };
    Ok(MergeOutcome::Merged(count))
}

/// Whether an empty destination can take over the source's arena as is.
///
/// Key segments the destination already holds, and its size cap, are only
/// honoured by the rebase path.
fn can_adopt(destination: &Feed, source: &Feed) -> Result<bool> {
    let fits = destination
        .config()
        .max_size
        .map_or(true, |max| source.tail() <= max);
    Ok(fits && destination.keys()?.is_empty())
}

/// Place a fragment by extending a copy of the source with it.
///
/// With a callback, every block the destination lacks is offered in chain
/// order before anything is committed. A stop that would cut the chain in
/// front of the destination's own blocks leaves the destination untouched.
fn reverse_merge(
    destination: &mut Feed,
    source: Source<'_>,
    options: MergeOptions,
    reversals_left: u32,
    on_each: Option<OnEach<'_>>,
) -> Result<MergeOutcome> {
    tracing::debug!(
        destination = destination.len(),
        source = source.feed().len(),
        "destination is a fragment, merging in reverse"
    );

    let before = destination.len();
    let mut base = source.into_owned(options.force_copy);
    let outcome = merge_inner(
        &mut base,
        Source::Borrowed(destination),
        options,
        reversals_left,
        None,
    )?;
    if let MergeOutcome::Rejected(divergence) = outcome {
        return Ok(MergeOutcome::Rejected(divergence));
    }

    if let Some(callback) = on_each {
        let held: HashSet<Signature> = destination
            .blocks()?
            .map(|block| block.signature())
            .collect();

        let mut keep = base.len();
        for (height, block) in base.blocks()?.enumerate() {
            if held.contains(&block.signature()) {
                continue;
            }
            match callback(&block) {
                MergeDecision::Continue => {}
                MergeDecision::StopKeepCurrent => {
                    keep = height + 1;
                    break;
                }
                MergeDecision::StopDiscardCurrent => {
                    keep = height;
                    break;
                }
            }
        }

        if keep < base.len() {
            let last_held = base
                .blocks()?
                .rposition(|block| held.contains(&block.signature()));
            if last_held.map_or(true, |height| keep <= height) {
                tracing::debug!(keep, "callback stopped ahead of the fragment");
                return Ok(MergeOutcome::Merged(0));
            }
            base.truncate(keep as isize)?;
        }
    }

    let after = base.len();
    destination.adopt(base)?;
    Ok(MergeOutcome::Merged(after.saturating_sub(before)))
}
