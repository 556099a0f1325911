//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use picofeed_core::{Feed, Keypair, PublicKey};

/// A test fixture: one author.
pub struct TestFixture {
    pub keypair: Keypair,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// The 64-byte secret form accepted by `Feed::append`.
    pub fn secret(&self) -> [u8; 64] {
        self.keypair.secret_bytes()
    }

    /// A fresh feed holding one block per body.
    pub fn feed(&self, bodies: &[&str]) -> Feed {
        let mut feed = Feed::new();
        self.extend(&mut feed, bodies);
        feed
    }

    /// Append one block per body.
    pub fn extend(&self, feed: &mut Feed, bodies: &[&str]) {
        for body in bodies {
            feed.append_with(body, &self.keypair)
                .expect("fixture append failed");
        }
    }

    /// A feed of `count` blocks with bodies `"0"`, `"1"`, ...
    pub fn numbered_feed(&self, count: usize) -> Feed {
        let mut feed = Feed::new();
        for i in 0..count {
            feed.append_with(i.to_string(), &self.keypair)
                .expect("fixture append failed");
        }
        feed
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Block bodies of a feed, as lossy UTF-8.
pub fn bodies(feed: &Feed) -> Vec<String> {
    feed.blocks()
        .expect("feed is stolen")
        .map(|block| String::from_utf8_lossy(block.body()).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_feed() {
        let fixture = TestFixture::with_seed([1; 32]);
        let feed = fixture.feed(&["a", "b"]);

        assert_eq!(bodies(&feed), vec!["a", "b"]);
        assert_eq!(feed.keys().unwrap(), vec![fixture.public_key()]);
    }

    #[test]
    fn test_fixture_secret_appends() {
        let fixture = TestFixture::new();
        let mut feed = Feed::new();
        feed.append("x", &fixture.secret()).unwrap();
        assert_eq!(
            feed.block(0).unwrap().author_key(),
            Some(fixture.public_key())
        );
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);

        // Each party has unique keys
        let pks: Vec<_> = parties.iter().map(|p| p.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
    }
}
