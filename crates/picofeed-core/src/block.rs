//! Block: a zero-copy view of one block segment.
//!
//! A `Block` borrows the feed's buffer, so it cannot outlive a mutation of
//! the feed that produced it. Detach it with [`Block::to_signed`] to keep
//! the bytes around.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{decode_block, BlockLayout};
use crate::crypto::{PublicKey, Signature};
use crate::error::{CodecError, FeedError};

/// A view over a block segment.
#[derive(Clone, Copy)]
pub struct Block<'a> {
    segment: &'a [u8],
    offset: usize,
    layout: BlockLayout,
    signer: Option<PublicKey>,
}

impl<'a> Block<'a> {
    /// Parse the block segment at `offset` in `buf`.
    ///
    /// Only the layout is checked; call [`Block::verify_with`] to check the
    /// signature.
    pub fn parse(buf: &'a [u8], offset: usize) -> Result<Self, CodecError> {
        let layout = decode_block(buf, offset)?;
        Ok(Self::from_layout(buf, offset, layout, None))
    }

    /// Build a view from an already decoded layout.
    pub(crate) fn from_layout(
        buf: &'a [u8],
        offset: usize,
        layout: BlockLayout,
        signer: Option<PublicKey>,
    ) -> Self {
        Self {
            segment: &buf[offset..offset + layout.size],
            offset,
            layout,
            signer,
        }
    }

    /// The block's signature, which is also its identity.
    pub fn signature(&self) -> Signature {
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&self.segment[self.layout.signature_range()]);
        Signature(sig)
    }

    /// The signature of the preceding block, `None` for genesis.
    pub fn parent_signature(&self) -> Option<Signature> {
        self.layout.parent_range().map(|range| {
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&self.segment[range]);
            Signature(sig)
        })
    }

    /// Whether this block starts a chain.
    pub fn is_genesis(&self) -> bool {
        !self.layout.has_parent()
    }

    /// The application payload.
    pub fn body(&self) -> &'a [u8] {
        &self.segment[self.layout.body_range()]
    }

    /// The author key carried inside the block, if any.
    pub fn embedded_key(&self) -> Option<PublicKey> {
        self.layout
            .author_range()
            .and_then(|range| PublicKey::from_slice(&self.segment[range]))
    }

    /// The verified signer, falling back to the embedded key.
    pub fn author_key(&self) -> Option<PublicKey> {
        self.signer.or_else(|| self.embedded_key())
    }

    /// The end-of-chain hint. Not authoritative.
    pub fn end_of_chain(&self) -> bool {
        self.layout.end_of_chain()
    }

    /// Offset of the segment in its buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the segment in bytes.
    pub fn size(&self) -> usize {
        self.layout.size
    }

    /// Offset just past the segment.
    pub fn end(&self) -> usize {
        self.offset + self.layout.size
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// The raw segment, tag included.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.segment
    }

    /// The bytes covered by the signature.
    pub fn signed_bytes(&self) -> &'a [u8] {
        &self.segment[self.layout.signed_range()]
    }

    /// Check the signature against `key`, remembering it on success.
    pub fn verify_with(&mut self, key: &PublicKey) -> Result<(), FeedError> {
        key.verify(self.signed_bytes(), &self.signature())?;
        self.signer = Some(*key);
        Ok(())
    }

    /// Check the signature against the remembered or embedded key.
    pub fn verify(&self) -> Result<(), FeedError> {
        let key = self.author_key().ok_or(FeedError::NoSigner)?;
        key.verify(self.signed_bytes(), &self.signature())
    }

    /// Copy the segment out of the buffer.
    pub fn to_signed(&self) -> SignedBlock {
        SignedBlock {
            bytes: Bytes::copy_from_slice(self.segment),
            signer: self.author_key(),
        }
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("offset", &self.offset)
            .field("signature", &self.signature())
            .field("genesis", &self.is_genesis())
            .field("body_len", &self.layout.body_len)
            .field("signer", &self.signer)
            .finish()
    }
}

/// A block detached from any feed buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    bytes: Bytes,
    signer: Option<PublicKey>,
}

impl SignedBlock {
    /// Wrap raw segment bytes. Trailing bytes after the segment are dropped.
    pub fn new(bytes: impl Into<Bytes>, signer: Option<PublicKey>) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        let layout = decode_block(&bytes, 0)?;
        Ok(Self {
            bytes: bytes.slice(..layout.size),
            signer,
        })
    }

    /// Borrow the block as a view.
    pub fn as_block(&self) -> Result<Block<'_>, CodecError> {
        let layout = decode_block(&self.bytes, 0)?;
        Ok(Block::from_layout(&self.bytes, 0, layout, self.signer))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn signer(&self) -> Option<PublicKey> {
        self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_block, BlockHeader};
    use crate::crypto::Keypair;

    fn signed(header: &BlockHeader, body: &[u8], keypair: &Keypair) -> Vec<u8> {
        let mut buf = vec![0u8; header.size_for(body.len())];
        let layout = encode_block(&mut buf, header, body).unwrap();
        let sig = keypair.sign(&buf[layout.signed_range()]);
        buf[layout.signature_range()].copy_from_slice(sig.as_bytes());
        buf
    }

    #[test]
    fn test_verify_with_remembers_key() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let buf = signed(&BlockHeader::default(), b"hello", &keypair);

        let mut block = Block::parse(&buf, 0).unwrap();
        assert!(matches!(block.verify(), Err(FeedError::NoSigner)));

        block.verify_with(&keypair.public_key()).unwrap();
        assert_eq!(block.author_key(), Some(keypair.public_key()));
        block.verify().unwrap();
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let other = Keypair::from_seed(&[0x43; 32]);
        let buf = signed(&BlockHeader::default(), b"hello", &keypair);

        let mut block = Block::parse(&buf, 0).unwrap();
        assert!(block.verify_with(&other.public_key()).is_err());
        assert_eq!(block.author_key(), None);
    }

    #[test]
    fn test_tampered_body_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut buf = signed(&BlockHeader::default(), b"hello", &keypair);
        let last = buf.len() - 1;
        buf[last] ^= 0x01;

        let mut block = Block::parse(&buf, 0).unwrap();
        assert!(block.verify_with(&keypair.public_key()).is_err());
    }

    #[test]
    fn test_end_of_chain_is_not_signed() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let header = BlockHeader {
            end_of_chain: true,
            ..Default::default()
        };
        let mut buf = signed(&header, b"hello", &keypair);
        buf[0] &= !crate::codec::tag::END_OF_CHAIN;

        let mut block = Block::parse(&buf, 0).unwrap();
        assert!(!block.end_of_chain());
        block.verify_with(&keypair.public_key()).unwrap();
    }

    #[test]
    fn test_embedded_author() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let parent = Signature::from_bytes([0x11; 64]);
        let header = BlockHeader {
            parent: Some(parent),
            author: Some(keypair.public_key()),
            end_of_chain: false,
        };
        let buf = signed(&header, b"self describing", &keypair);

        let block = Block::parse(&buf, 0).unwrap();
        assert!(!block.is_genesis());
        assert_eq!(block.parent_signature(), Some(parent));
        assert_eq!(block.embedded_key(), Some(keypair.public_key()));
        assert_eq!(block.body(), b"self describing");
        block.verify().unwrap();
    }

    #[test]
    fn test_view_spans_segment_only() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut buf = vec![0xee; 7];
        let segment = signed(&BlockHeader::default(), b"x", &keypair);
        buf.extend_from_slice(&segment);
        buf.extend_from_slice(&[0xee; 5]);

        let block = Block::parse(&buf, 7).unwrap();
        assert_eq!(block.offset(), 7);
        assert_eq!(block.end(), 7 + segment.len());
        assert_eq!(block.as_bytes(), &segment[..]);
    }

    #[test]
    fn test_signed_block_detach() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let buf = signed(&BlockHeader::default(), b"detached", &keypair);

        let mut block = Block::parse(&buf, 0).unwrap();
        block.verify_with(&keypair.public_key()).unwrap();
        let owned = block.to_signed();
        drop(buf);

        let view = owned.as_block().unwrap();
        assert_eq!(view.body(), b"detached");
        assert_eq!(view.author_key(), Some(keypair.public_key()));
        view.verify().unwrap();
    }
}
