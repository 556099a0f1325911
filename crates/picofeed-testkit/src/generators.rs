//! Proptest generators for property-based testing.

use proptest::prelude::*;

use picofeed_core::{Feed, FeedConfig, Keypair, PublicKey};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random PublicKey.
pub fn public_key() -> impl Strategy<Value = PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a non-empty block body of at most `max_len` bytes.
pub fn body(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Generate up to `max_blocks` block bodies.
pub fn bodies(max_blocks: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(body(200), 0..=max_blocks)
}

/// Parameters for generating a feed.
#[derive(Debug, Clone)]
pub struct FeedParams {
    pub seed: [u8; 32],
    pub bodies: Vec<Vec<u8>>,
    pub embed_author: bool,
}

impl Arbitrary for FeedParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), bodies(12), any::<bool>())
            .prop_map(|(seed, bodies, embed_author)| FeedParams {
                seed,
                bodies,
                embed_author,
            })
            .boxed()
    }
}

/// Build a feed from parameters.
pub fn feed_from_params(params: &FeedParams) -> Feed {
    let keypair = Keypair::from_seed(&params.seed);
    let mut feed = Feed::with_config(FeedConfig {
        embed_author: params.embed_author,
        max_size: None,
        ..Default::default()
    });
    for body in &params.bodies {
        feed.append_with(body, &keypair)
            .expect("generated body must append");
    }
    feed
}

/// A shared history that two writers extend independently.
#[derive(Debug, Clone)]
pub struct ForkParams {
    pub seed: [u8; 32],
    pub base: Vec<Vec<u8>>,
    pub left: Vec<Vec<u8>>,
    pub right: Vec<Vec<u8>>,
}

impl Arbitrary for ForkParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), bodies(6), bodies(4), bodies(4))
            .prop_map(|(seed, base, left, right)| ForkParams {
                seed,
                base,
                left,
                right,
            })
            .boxed()
    }
}

/// Build the `(left, right)` feeds of a fork.
pub fn fork_from_params(params: &ForkParams) -> (Feed, Feed) {
    let keypair = Keypair::from_seed(&params.seed);
    let mut base = Feed::new();
    for body in &params.base {
        base.append_with(body, &keypair)
            .expect("generated body must append");
    }

    let mut left = base.clone();
    for body in &params.left {
        left.append_with(body, &keypair)
            .expect("generated body must append");
    }
    let mut right = base;
    for body in &params.right {
        right
            .append_with(body, &keypair)
            .expect("generated body must append");
    }
    (left, right)
}
