//! Convergence verification.
//!
//! After exchanging blocks, two holders of a feed can check they ended up
//! with the same chain by comparing its length, head signature and a
//! digest over every block signature, without shipping the feed again.

use picofeed_core::{Feed, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Domain separator for chain digests.
const CHAIN_DIGEST_DOMAIN: &[u8] = b"picofeed-chain-v0:";

/// Blake3 digest over a feed's block signatures, in chain order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainDigest(pub [u8; 32]);

impl ChainDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ChainDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainDigest({})", &self.to_hex()[..16])
    }
}

/// Compute the chain digest of a feed.
///
/// Algorithm:
/// 1. Seed the hasher with the domain separator
/// 2. Feed it every block signature in order
/// 3. Return the final hash
pub fn chain_digest(feed: &Feed) -> Result<ChainDigest> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CHAIN_DIGEST_DOMAIN);
    for block in feed.blocks()? {
        hasher.update(block.signature().as_bytes());
    }
    Ok(ChainDigest(*hasher.finalize().as_bytes()))
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both sides hold the same chain.
    Converged,
    /// The sides differ; another merge round may fix it.
    NotConverged { reason: String },
    /// Same length, different heads: the author signed two histories.
    Forked {
        at_height: usize,
        local: Signature,
        remote: Signature,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }

    pub fn is_forked(&self) -> bool {
        matches!(self, ConvergenceResult::Forked { .. })
    }
}

/// Check whether `local` matches a remote feed's summary.
pub fn verify_convergence(
    local: &Feed,
    remote_len: usize,
    remote_head: Option<&Signature>,
    remote_digest: Option<&ChainDigest>,
) -> Result<ConvergenceResult> {
    let local_head = local.last()?.map(|block| block.signature());

    if local.len() != remote_len {
        return Ok(ConvergenceResult::NotConverged {
            reason: format!(
                "length mismatch: local={}, remote={}",
                local.len(),
                remote_len
            ),
        });
    }

    match (local_head, remote_head) {
        (None, None) => {}
        (Some(local_head), Some(remote_head)) if local_head != *remote_head => {
            tracing::warn!(height = remote_len - 1, "feed heads differ at equal length");
            return Ok(ConvergenceResult::Forked {
                at_height: remote_len - 1,
                local: local_head,
                remote: *remote_head,
            });
        }
        (Some(_), Some(_)) => {}
        _ => {
            return Ok(ConvergenceResult::NotConverged {
                reason: "only one side has a head".into(),
            });
        }
    }

    if let Some(remote_digest) = remote_digest {
        if chain_digest(local)? != *remote_digest {
            return Ok(ConvergenceResult::NotConverged {
                reason: "chain digest mismatch".into(),
            });
        }
    }

    Ok(ConvergenceResult::Converged)
}
