//! Golden test vectors for deterministic verification.
//!
//! Ed25519 signing is deterministic, so a feed built from a fixed seed and
//! fixed bodies has fixed wire bytes. These vectors pin the wire size and
//! the head signature.

use picofeed_core::{Feed, FeedConfig, Keypair};
use serde::Serialize;

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    /// Block bodies, in append order.
    pub bodies: &'static [&'static str],
    /// Embed the author key in each block.
    pub embed_author: bool,
    /// Expected author public key (hex).
    pub expected_public_key: &'static str,
    /// Expected wire size in bytes.
    pub expected_size: usize,
    /// Expected signature of the last block (hex).
    pub expected_head: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "single genesis block",
            seed: [0x42; 32],
            bodies: &["Hello World"],
            embed_author: false,
            expected_public_key: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_size: 114,
            expected_head: "5de4f3509ce8ae3850485ba78d62107da1c4777895434e233dcb124a8e4e9229\
                            d77d6a0433301fb449bc7e32aa901234dceb9c14305a59850a850f06795b7106",
        },
        GoldenVector {
            name: "two linked blocks",
            seed: [0x42; 32],
            bodies: &["Hello World", "</world>"],
            embed_author: false,
            expected_public_key: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_size: 252,
            expected_head: "fb3ff33d1e880c119cc8b1c295935a71f200ed93a2d15a3c528d0787bef1563a\
                            4f546d5d6d8cf7e98b0ed48fcfd7955994e9100c0dd8e6955369c25b989c9d09",
        },
        GoldenVector {
            name: "embedded author",
            seed: [0x07; 32],
            bodies: &["self contained"],
            embed_author: true,
            expected_public_key: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_size: 116,
            expected_head: "1be421bf7363552644385437d53afe16776d4c4f41172a3ebc71069c2d118923\
                            10e3a3114d0c715dc98972d842c5097325f56978a676e275742d5ed8738c7d09",
        },
    ]
}

/// Expected pickle of the "single genesis block" vector.
pub const SINGLE_BLOCK_PICKLE: &str = "PIC0.K0.IVL40Zt5HSRFMkLhXy6rbLfP-ntqXtMAl5YOBpiB2xI\
B0.sl3k81Cc6K44UEhbp41iEH2hxHd4lUNOIz3LEkqOTpIp131qBDMwH7RJvH4yqpASNNzrnBQwWlmFCoUPBnlbcQYLSGVsbG8gV29ybGQ";

/// Build the feed a vector describes.
pub fn feed_from_vector(vector: &GoldenVector) -> Feed {
    let keypair = Keypair::from_seed(&vector.seed);
    let mut feed = Feed::with_config(FeedConfig {
        embed_author: vector.embed_author,
        ..Default::default()
    });
    for body in vector.bodies {
        feed.append_with(body, &keypair)
            .expect("vector body must append");
    }
    feed
}

/// Check every vector against a freshly built feed.
///
/// Returns `(name, matches, head hex)` per vector. An empty expected value
/// always matches, so the report can be used to fill new vectors in.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let feed = feed_from_vector(v);
            let head = feed
                .last()
                .ok()
                .flatten()
                .map(|block| block.signature().to_hex())
                .unwrap_or_default();

            let matches = (v.expected_head.is_empty() || head == v.expected_head)
                && feed.tail() == v.expected_size;

            (v.name.to_string(), matches, head)
        })
        .collect()
}

/// Dump the vectors as JSON for other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
