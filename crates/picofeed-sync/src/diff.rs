//! Diff: how far apart two feeds are.
//!
//! The diff aligns `other`'s first block against `ours` and walks both
//! chains in lockstep. It reads signatures only and never touches bodies.

use picofeed_core::{Block, Feed};

use crate::error::{Divergence, Result};

/// Compare `ours` against `other`.
///
/// - `Ok(0)`: same blocks from the alignment point on.
/// - `Ok(k)`, `k > 0`: `other` has `k` blocks past the end of `ours`.
/// - `Ok(-k)`: `other` lacks the last `k` blocks of `ours`.
/// - `Err(Divergence::Diverged)`: shared ancestor, then different blocks.
/// - `Err(Divergence::Unrelated)`: `other` does not start anywhere in `ours`.
///
/// An unrelated result can be a false negative when `ours` is a fragment
/// that starts after `other` does.
pub fn diff(ours: &Feed, other: &Feed) -> Result<isize> {
    let a: Vec<Block<'_>> = ours.blocks()?.collect();
    let b: Vec<Block<'_>> = other.blocks()?.collect();

    if a.is_empty() {
        return Ok(b.len() as isize);
    }
    if b.is_empty() {
        return Ok(-(a.len() as isize));
    }

    let Some(start) = align(&a, &b[0]) else {
        return Err(Divergence::Unrelated.into());
    };
    let Some(start) = start else {
        // `other` starts right after our last block.
        return Ok(b.len() as isize);
    };

    let mut ia = start;
    let mut ib = 0;
    while ia < a.len() && ib < b.len() {
        if a[ia].signature() != b[ib].signature() {
            return Err(Divergence::Diverged {
                self_height: ia,
                other_height: ib,
            }
            .into());
        }
        ia += 1;
        ib += 1;
    }

    Ok(if ia == a.len() {
        (b.len() - ib) as isize
    } else {
        -((a.len() - ia) as isize)
    })
}

/// Find the height in `a` that lines up with `first`.
///
/// `None` when nothing lines up, `Some(None)` when `first` follows the last
/// block of `a`.
fn align(a: &[Block<'_>], first: &Block<'_>) -> Option<Option<usize>> {
    let target = first.parent_signature();

    for (height, block) in a.iter().enumerate() {
        if block.parent_signature() == target {
            return Some(Some(height));
        }
        if Some(block.signature()) == target {
            let next = height + 1;
            return Some((next < a.len()).then_some(next));
        }
    }
    None
}
