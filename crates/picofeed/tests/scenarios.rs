//! End-to-end feed scenarios: append, pickle, truncate, slice and merge.

use picofeed::{
    Block, Divergence, Feed, FeedConfig, FeedError, FeedExt, MergeDecision, MergeOutcome,
    PicofeedError, SignedBlock,
};
use picofeed_testkit::fixtures::{bodies, TestFixture};

fn init_tracing() {
    tracing_subscriber::fmt::try_init().ok();
}

fn author() -> TestFixture {
    init_tracing();
    TestFixture::with_seed([0x11; 32])
}

#[test]
fn test_new_feed() {
    let fixture = author();
    let secret = fixture.secret();
    let mut feed = Feed::new();

    assert_eq!(feed.append("Hello World", &secret).unwrap(), 1);
    assert_eq!(feed.get(0).unwrap(), b"Hello World");
    assert_eq!(feed.append("</world>", &secret).unwrap(), 2);
    assert_eq!(feed.get(1).unwrap(), b"</world>");

    let first = feed.block(0).unwrap();
    let second = feed.block(1).unwrap();
    assert!(first.is_genesis());
    assert_eq!(second.parent_signature(), Some(first.signature()));

    let text = feed.pickle().unwrap();
    let copy = Feed::from_like(text.as_str()).unwrap();
    assert_eq!(copy.get(0).unwrap(), b"Hello World");
    assert_eq!(copy.len(), 2);
}

#[test]
fn test_truncation() {
    let fixture = author();
    let mut feed = Feed::new();
    fixture.extend(&mut feed, &["Hello World!", "New shoes,", "still good"]);

    assert!(feed.truncate(1).unwrap());
    assert_eq!(feed.len(), 1);
    assert_eq!(
        feed.append_with("are comfty", &fixture.keypair).unwrap(),
        2
    );
    assert_eq!(bodies(&feed), vec!["Hello World!", "are comfty"]);
}

#[test]
fn test_truncate_to_zero() {
    let fixture = author();
    let mut feed = fixture.feed(&["Hello World!", "New shoes,", "still good"]);

    assert!(feed.truncate(0).unwrap());
    assert!(feed.is_empty());
    assert_eq!(
        feed.append_with("are comfty", &fixture.keypair).unwrap(),
        1
    );
    assert_eq!(bodies(&feed), vec!["are comfty"]);
}

#[test]
fn test_conflict_detection() {
    let fixture = author();
    let a = fixture.feed(&["B0"]);
    let mut b = a.clone();
    fixture.extend(&mut b, &["B1", "B2"]);

    // B supersedes A.
    let ahead = a.diff(&b).unwrap();
    assert_eq!(ahead, 2);
    assert_eq!(b.get(b.len() - ahead as usize).unwrap(), b"B1");
    assert_eq!(b.diff(&b.clone()).unwrap(), 0);
    assert_eq!(b.diff(&a).unwrap(), -2);

    // Two genesis blocks: same starting point, different content.
    let mut c = fixture.feed(&["B3", "B4"]);
    let expected = Divergence::Diverged {
        self_height: 0,
        other_height: 0,
    };
    assert_eq!(b.diff(&c).unwrap_err().divergence(), Some(expected));
    assert_eq!(c.diff(&b).unwrap_err().divergence(), Some(expected));

    // Common history, conflict at height 2.
    let mut d = c.clone();
    fixture.extend(&mut c, &["B5"]);
    fixture.extend(&mut d, &["B6"]);
    assert_eq!(
        d.diff(&c).unwrap_err().divergence(),
        Some(Divergence::Diverged {
            self_height: 2,
            other_height: 2
        })
    );

    fixture.extend(&mut d, &["B7", "B8"]);
    let mut e = d.clone();
    e.truncate(2).unwrap();
    assert_eq!(d.diff(&e).unwrap(), -3);
}

#[test]
fn test_slices_and_reverse_merges() {
    let fixture = author();
    let mut a = fixture.feed(&["zero"]);
    let b = a.clone();
    assert!(!a.is_partial());
    assert!(!b.is_partial());
    fixture.extend(&mut a, &["one", "two"]);

    let mut s1 = a.slice(1, None).unwrap();
    let s2 = a.slice(2, None).unwrap();
    assert!(s1.is_partial());
    assert!(s2.is_partial());
    assert_eq!(bodies(&s1), vec!["one", "two"]);
    assert_eq!(bodies(&s2), vec!["two"]);

    // [0].merge([1, 2])
    let mut c = b.clone();
    assert_eq!(c.merge(&s1).unwrap(), MergeOutcome::Merged(2));
    assert_eq!(c.get(1).unwrap(), b"one");

    // Same, through a pickle.
    let mut d = b.clone();
    d.merge(s1.pickle().unwrap().as_str()).unwrap();
    assert_eq!(d.get(2).unwrap(), b"two");

    // [0].merge([2]) has nothing to attach to.
    let mut e = b.clone();
    let outcome = e.merge(&s2).unwrap();
    assert_eq!(outcome, MergeOutcome::Rejected(Divergence::Unrelated));
    assert_eq!(outcome.count(), -1);
    assert_eq!(e.len(), 1);

    // [1, 2].merge([0]) flips direction.
    s1.merge(&b).unwrap();
    assert_eq!(bodies(&s1), vec!["zero", "one", "two"]);
    assert!(!s1.is_partial());

    // [2].merge([1]) yields [1, 2].
    let mut f = fixture.feed(&["zero", "one"]);
    let g = f.slice(1, None).unwrap();
    fixture.extend(&mut f, &["two"]);
    let mut h = f.slice(2, None).unwrap();
    h.merge(&g).unwrap();
    assert_eq!(bodies(&h), vec!["one", "two"]);
}

#[test]
fn test_merge_when_empty() {
    let fixture = author();
    let mut a = fixture.feed(&["Hello World"]);
    let mut b = Feed::new();

    b.merge(a.pickle().unwrap().as_str()).unwrap();
    assert_eq!(b.get(0).unwrap(), a.get(0).unwrap());

    fixture.extend(&mut a, &["Bye world!"]);
    assert_eq!(b.len(), 1);
    assert_eq!(
        b.merge(a.pickle().unwrap().as_str()).unwrap(),
        MergeOutcome::Merged(1)
    );
    assert_eq!(b.len(), 2);
    assert_eq!(b.get(1).unwrap(), a.get(1).unwrap());
}

#[test]
fn test_binary_bodies_are_kept_verbatim() {
    let fixture = author();
    let body = [0u8, 0, 1, 2, 3];
    let mut feed = Feed::new();
    feed.append_with(body, &fixture.keypair).unwrap();
    assert_eq!(feed.get(0).unwrap(), &body);
}

#[test]
fn test_callback_sees_blocks_while_merging() {
    let fixture = author();
    let mut a = fixture.feed(&["Hey", "How are you?"]);
    let mut b = Feed::new();

    let mut seen = Vec::new();
    b.merge_with(&a, |block: &Block<'_>| {
        seen.push(block.body().to_vec());
        MergeDecision::Continue
    })
    .unwrap();
    assert_eq!(seen, vec![b"Hey".to_vec(), b"How are you?".to_vec()]);

    let outcome = b
        .merge_with(&a, |_: &Block<'_>| panic!("nothing to merge"))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Merged(0));

    fixture.extend(&mut b, &["Good"]);
    let mut seen = Vec::new();
    a.merge_with(&b, |block: &Block<'_>| {
        seen.push(block.body().to_vec());
        MergeDecision::Continue
    })
    .unwrap();
    assert_eq!(seen, vec![b"Good".to_vec()]);

    fixture.extend(&mut a, &["Great!"]);
    b.merge(&a).unwrap();

    let mut fork = a.clone();
    fork.truncate(-1).unwrap();
    fixture.extend(&mut fork, &["Great! Did you hear the news???"]);

    let outcome = b
        .merge_with(&fork, |_: &Block<'_>| MergeDecision::StopDiscardCurrent)
        .unwrap();
    assert!(outcome.is_rejected());
    let last = b.last().unwrap().unwrap();
    assert_eq!(last.body(), b"Great!");
}

#[test]
fn test_callback_can_stop_early() {
    let fixture = author();
    let source = fixture.numbered_feed(5);

    let mut keep_two = Feed::new();
    let mut offered = 0;
    let outcome = keep_two
        .merge_with(&source, |_: &Block<'_>| {
            offered += 1;
            if offered == 2 {
                MergeDecision::StopKeepCurrent
            } else {
                MergeDecision::Continue
            }
        })
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Merged(2));
    assert_eq!(bodies(&keep_two), vec!["0", "1"]);

    let mut keep_one = Feed::new();
    let mut offered = 0;
    keep_one
        .merge_with(&source, |_: &Block<'_>| {
            offered += 1;
            if offered == 2 {
                MergeDecision::StopDiscardCurrent
            } else {
                MergeDecision::Continue
            }
        })
        .unwrap();
    assert_eq!(bodies(&keep_one), vec!["0"]);
}

#[test]
fn test_slice_range() {
    let fixture = author();
    let feed = fixture.numbered_feed(6);
    let range = feed.slice(2, Some(5)).unwrap();
    assert_eq!(bodies(&range), vec!["2", "3", "4"]);
    assert_eq!(bodies(&feed.slice(-2, None).unwrap()), vec!["4", "5"]);
}

#[test]
fn test_blocks_carry_author_key() {
    let fixture = author();
    let feed = fixture.feed(&["First", "Second"]);
    for block in feed.blocks().unwrap() {
        assert_eq!(block.author_key(), Some(fixture.public_key()));
        block.verify().unwrap();
    }
    assert_eq!(
        feed.last().unwrap().unwrap().author_key(),
        Some(fixture.public_key())
    );
}

#[test]
fn test_merge_accepts_single_blocks() {
    let fixture = author();
    let a = fixture.feed(&["alpha", "beta", "gamma"]);

    let mut b = Feed::new();
    for block in a.blocks().unwrap() {
        b.merge(block).unwrap();
    }
    assert_eq!(b.len(), a.len());
    assert_eq!(b.as_bytes().unwrap(), a.as_bytes().unwrap());

    let mut c = Feed::new();
    c.merge(a.blocks().unwrap().collect::<Vec<_>>()).unwrap();
    assert_eq!(bodies(&c), vec!["alpha", "beta", "gamma"]);

    let detached: Vec<_> = a.blocks().unwrap().map(|block| block.to_signed()).collect();
    let mut d = Feed::new();
    d.merge(detached).unwrap();
    assert_eq!(d.len(), 3);
}

#[test]
fn test_merge_refuses_tampered_detached_blocks() {
    let fixture = author();
    let feed = fixture.feed(&["honest", "still honest"]);

    let mut detached: Vec<SignedBlock> =
        feed.blocks().unwrap().map(|block| block.to_signed()).collect();
    let mut bytes = detached[1].bytes().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    detached[1] = SignedBlock::new(bytes, Some(fixture.public_key())).unwrap();

    let mut replica = Feed::new();
    let err = replica.merge(detached).unwrap_err();
    assert!(matches!(
        err,
        PicofeedError::Feed(FeedError::InvalidSignature)
    ));
    assert!(replica.is_empty());
}

#[test]
fn test_foreign_authors_interleave() {
    let alice = TestFixture::with_seed([0xa1; 32]);
    let bob = TestFixture::with_seed([0xb0; 32]);

    let mut feed = alice.feed(&["hi bob"]);
    bob.extend(&mut feed, &["hi alice"]);
    alice.extend(&mut feed, &["bye"]);

    let copy = Feed::from_like(feed.pickle().unwrap().as_str()).unwrap();
    assert_eq!(copy.keys().unwrap(), vec![alice.public_key(), bob.public_key()]);
    let authors: Vec<_> = copy.blocks().unwrap().map(|b| b.author_key()).collect();
    assert_eq!(
        authors,
        vec![
            Some(alice.public_key()),
            Some(bob.public_key()),
            Some(alice.public_key())
        ]
    );
}

#[test]
fn test_stolen_feed_is_inert() {
    let fixture = author();
    let mut feed = fixture.feed(&["a", "b"]);
    let mut replica = Feed::new();

    replica.merge(feed.take().unwrap()).unwrap();
    assert_eq!(replica.len(), 2);

    assert!(feed.is_stolen());
    assert_eq!(feed.len(), 0);
    assert!(matches!(
        feed.append_with("c", &fixture.keypair),
        Err(FeedError::Stolen)
    ));
    assert!(matches!(feed.pickle(), Err(FeedError::Stolen)));
    assert!(feed.diff(&replica).unwrap_err().is_stolen());
    assert!(replica.merge(&feed).unwrap_err().is_stolen());
}

#[test]
fn test_flipped_body_byte_stops_indexing() {
    let fixture = author();
    let feed = fixture.feed(&["one", "two", "three"]);

    let mut bytes = feed.as_bytes().unwrap().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let damaged = Feed::from_bytes(&bytes).unwrap();
    assert_eq!(bodies(&damaged), vec!["one", "two"]);
}

#[test]
fn test_bricked_block_never_indexes() {
    let fixture = author();
    let feed = fixture.feed(&["one", "two", "three"]);
    let offset = feed.block(1).unwrap().offset();

    let mut bytes = feed.as_bytes().unwrap().to_vec();
    bytes[offset] = 0x00;

    let bricked = Feed::from_bytes(&bytes).unwrap();
    assert_eq!(bodies(&bricked), vec!["one"]);
}

#[test]
fn test_size_cap_reports_room() {
    let fixture = author();
    let mut feed = Feed::with_config(FeedConfig {
        initial_capacity: 64,
        max_size: Some(256),
        ..Default::default()
    });

    feed.append_with("small", &fixture.keypair).unwrap();
    let before = feed.tail();
    let err = feed.append_with(vec![0x42; 300], &fixture.keypair).unwrap_err();
    match err {
        FeedError::FeedOverflow {
            required,
            available,
        } => {
            assert_eq!(available, 256 - before);
            assert!(required > available);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(feed.tail(), before);
    assert_eq!(feed.len(), 1);
}
