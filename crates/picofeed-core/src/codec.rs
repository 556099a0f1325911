//! Binary wire format for feeds.
//!
//! A feed buffer is a fixed magic header followed by a sequence of
//! segments. Every segment starts with a one-byte tag:
//!
//! ```text
//! feed    := MAGIC segment*
//! key     := tag(0xA1) public_key[32]
//! block   := tag signature[64] parent[64]? varint(len) author[32]? body[len]
//!
//! tag     := 0b101_fffkk
//!            kk = 01 key, 10 block
//!            0x04 parent signature present
//!            0x08 author key embedded
//!            0x10 end-of-chain hint
//! ```
//!
//! The tag sits in front of the signature and is not signed. The signature
//! covers every byte of the block after the signature field. Changing a
//! structural flag changes how the rest of the segment parses, and with it
//! the signed bytes, so only the end-of-chain hint can be flipped without
//! breaking verification.
//!
//! Every function here is pure and bounds-checked: decoding never reads
//! past the slice it is handed, encoding never writes past its destination.

use std::ops::Range;

use crate::crypto::{PublicKey, Signature, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::CodecError;

/// Magic marker at the start of every feed buffer.
pub const MAGIC: &[u8; 4] = b"PiC0";

/// Length of the magic header.
pub const HEADER_SIZE: usize = MAGIC.len();

/// Length of a segment tag.
pub const TAG_SIZE: usize = 1;

/// Length of an encoded key segment.
pub const KEY_SEGMENT_SIZE: usize = TAG_SIZE + PUBLIC_KEY_SIZE;

/// Tag value written over discarded blocks. Matches no segment pattern.
pub const BRICK: u8 = 0x00;

/// Longest varint accepted for a 64-bit value.
pub const MAX_VARINT_SIZE: usize = 10;

/// Offset of the signed region inside a block segment.
const SIGNED_START: usize = TAG_SIZE + SIGNATURE_SIZE;

/// Tag byte layout.
pub mod tag {
    pub const PATTERN_MASK: u8 = 0b1110_0000;
    pub const PATTERN: u8 = 0b1010_0000;
    pub const KIND_MASK: u8 = 0b0000_0011;
    pub const KIND_KEY: u8 = 0b01;
    pub const KIND_BLOCK: u8 = 0b10;

    /// Block carries a parent signature.
    pub const PARENT: u8 = 0x04;
    /// Block embeds its author's public key.
    pub const AUTHOR: u8 = 0x08;
    /// Block was the last one in its buffer when written. A hint only.
    pub const END_OF_CHAIN: u8 = 0x10;

    pub const KEY: u8 = PATTERN | KIND_KEY;
    pub const BLOCK: u8 = PATTERN | KIND_BLOCK;
}

/// The two kinds of segment a feed holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Key,
    Block,
}

/// Classify a tag byte. Returns `None` for anything unrecognized.
pub fn classify(tag: u8) -> Option<SegmentKind> {
    if tag == tag::KEY {
        return Some(SegmentKind::Key);
    }
    if tag & tag::PATTERN_MASK == tag::PATTERN && tag & tag::KIND_MASK == tag::KIND_BLOCK {
        return Some(SegmentKind::Block);
    }
    None
}

fn need(buf: &[u8], offset: usize, needed: usize) -> Result<(), CodecError> {
    let available = buf.len().saturating_sub(offset);
    if needed > available {
        return Err(CodecError::BufferUnderflow {
            offset,
            needed,
            available,
        });
    }
    Ok(())
}

/// Check that `buf` starts with the magic header.
pub fn check_magic(buf: &[u8]) -> Result<(), CodecError> {
    match buf.get(..HEADER_SIZE) {
        Some(head) if head == MAGIC => Ok(()),
        _ => Err(CodecError::BadMagic),
    }
}

/// Read the tag at `offset` and classify it.
pub fn peek_kind(buf: &[u8], offset: usize) -> Result<SegmentKind, CodecError> {
    need(buf, offset, TAG_SIZE)?;
    let tag = buf[offset];
    classify(tag).ok_or(CodecError::UnknownTag { offset, tag })
}

// ─────────────────────────────────────────────────────────────────────────
// Varints
// ─────────────────────────────────────────────────────────────────────────

/// Number of bytes needed to encode `n`.
pub fn varint_size(mut n: u64) -> usize {
    let mut size = 1;
    while n >= 0x80 {
        n >>= 7;
        size += 1;
    }
    size
}

/// Encode `n` as a little-endian base-128 varint at the start of `dst`.
///
/// Returns the number of bytes written.
pub fn encode_varint(dst: &mut [u8], mut n: u64) -> Result<usize, CodecError> {
    let needed = varint_size(n);
    if dst.len() < needed {
        return Err(CodecError::DestinationTooSmall {
            needed,
            available: dst.len(),
        });
    }

    let mut i = 0;
    while n >= 0x80 {
        dst[i] = (n as u8 & 0x7f) | 0x80;
        n >>= 7;
        i += 1;
    }
    dst[i] = n as u8;
    Ok(i + 1)
}

/// Decode a varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), CodecError> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_SIZE {
        need(buf, offset + i, 1)?;
        let byte = buf[offset + i];
        let bits = u64::from(byte & 0x7f);

        // Tenth byte may only contribute the 64th bit.
        if i == MAX_VARINT_SIZE - 1 && bits > 1 {
            return Err(CodecError::VarintOverflow { offset });
        }

        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::VarintOverflow { offset })
}

// ─────────────────────────────────────────────────────────────────────────
// Key segments
// ─────────────────────────────────────────────────────────────────────────

/// Decode the key segment at `offset`.
pub fn decode_key(buf: &[u8], offset: usize) -> Result<PublicKey, CodecError> {
    need(buf, offset, TAG_SIZE)?;
    if buf[offset] != tag::KEY {
        return Err(CodecError::UnknownTag {
            offset,
            tag: buf[offset],
        });
    }
    need(buf, offset, KEY_SEGMENT_SIZE)?;

    let mut key = [0u8; PUBLIC_KEY_SIZE];
    key.copy_from_slice(&buf[offset + TAG_SIZE..offset + KEY_SEGMENT_SIZE]);
    Ok(PublicKey(key))
}

/// Encode a key segment at the start of `dst`.
pub fn encode_key(dst: &mut [u8], key: &PublicKey) -> Result<usize, CodecError> {
    if dst.len() < KEY_SEGMENT_SIZE {
        return Err(CodecError::DestinationTooSmall {
            needed: KEY_SEGMENT_SIZE,
            available: dst.len(),
        });
    }
    dst[0] = tag::KEY;
    dst[TAG_SIZE..KEY_SEGMENT_SIZE].copy_from_slice(key.as_bytes());
    Ok(KEY_SEGMENT_SIZE)
}

// ─────────────────────────────────────────────────────────────────────────
// Block segments
// ─────────────────────────────────────────────────────────────────────────

/// Field positions of one block segment, relative to the segment start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// The raw tag byte.
    pub tag: u8,
    /// Total segment size, tag included.
    pub size: usize,
    /// Where the body starts.
    pub body_offset: usize,
    /// Declared body length.
    pub body_len: usize,
}

impl BlockLayout {
    pub fn has_parent(&self) -> bool {
        self.tag & tag::PARENT != 0
    }

    pub fn embeds_author(&self) -> bool {
        self.tag & tag::AUTHOR != 0
    }

    pub fn end_of_chain(&self) -> bool {
        self.tag & tag::END_OF_CHAIN != 0
    }

    pub fn signature_range(&self) -> Range<usize> {
        TAG_SIZE..SIGNED_START
    }

    pub fn parent_range(&self) -> Option<Range<usize>> {
        self.has_parent()
            .then(|| SIGNED_START..SIGNED_START + SIGNATURE_SIZE)
    }

    pub fn author_range(&self) -> Option<Range<usize>> {
        self.embeds_author()
            .then(|| self.body_offset - PUBLIC_KEY_SIZE..self.body_offset)
    }

    pub fn body_range(&self) -> Range<usize> {
        self.body_offset..self.body_offset + self.body_len
    }

    /// Bytes covered by the signature.
    pub fn signed_range(&self) -> Range<usize> {
        SIGNED_START..self.size
    }
}

/// Headers for a block that is about to be written.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHeader {
    /// Signature of the preceding block, `None` for genesis.
    pub parent: Option<Signature>,
    /// Author key to embed, `None` to rely on the key table.
    pub author: Option<PublicKey>,
    /// Set the end-of-chain hint.
    pub end_of_chain: bool,
}

impl BlockHeader {
    /// The tag byte these headers produce.
    pub fn tag(&self) -> u8 {
        let mut tag = tag::BLOCK;
        if self.parent.is_some() {
            tag |= tag::PARENT;
        }
        if self.author.is_some() {
            tag |= tag::AUTHOR;
        }
        if self.end_of_chain {
            tag |= tag::END_OF_CHAIN;
        }
        tag
    }

    /// Encoded size of a block with these headers and a body of `body_len`.
    pub fn size_for(&self, body_len: usize) -> usize {
        block_size(body_len, self.parent.is_some(), self.author.is_some())
    }
}

/// Size formula for a block segment.
pub fn block_size(body_len: usize, has_parent: bool, embeds_author: bool) -> usize {
    let mut size = SIGNED_START;
    if has_parent {
        size += SIGNATURE_SIZE;
    }
    size += varint_size(body_len as u64);
    if embeds_author {
        size += PUBLIC_KEY_SIZE;
    }
    size + body_len
}

/// Locate the fields of the block segment at `offset`.
pub fn decode_block(buf: &[u8], offset: usize) -> Result<BlockLayout, CodecError> {
    need(buf, offset, TAG_SIZE)?;
    let tag = buf[offset];
    if classify(tag) != Some(SegmentKind::Block) {
        return Err(CodecError::UnknownTag { offset, tag });
    }

    need(buf, offset, SIGNED_START)?;
    let mut pos = offset + SIGNED_START;

    if tag & tag::PARENT != 0 {
        need(buf, pos, SIGNATURE_SIZE)?;
        pos += SIGNATURE_SIZE;
    }

    let (declared, n) = decode_varint(buf, pos)?;
    pos += n;

    if tag & tag::AUTHOR != 0 {
        need(buf, pos, PUBLIC_KEY_SIZE)?;
        pos += PUBLIC_KEY_SIZE;
    }

    let available = buf.len().saturating_sub(pos);
    let body_len = usize::try_from(declared).map_err(|_| CodecError::BufferUnderflow {
        offset: pos,
        needed: usize::MAX,
        available,
    })?;
    need(buf, pos, body_len)?;

    Ok(BlockLayout {
        tag,
        size: pos + body_len - offset,
        body_offset: pos - offset,
        body_len,
    })
}

/// Encode a block segment at the start of `dst` with a zeroed signature.
///
/// The caller signs `layout.signed_range()` afterwards and writes the
/// signature into `layout.signature_range()`.
pub fn encode_block(
    dst: &mut [u8],
    header: &BlockHeader,
    body: &[u8],
) -> Result<BlockLayout, CodecError> {
    let size = header.size_for(body.len());
    if dst.len() < size {
        return Err(CodecError::DestinationTooSmall {
            needed: size,
            available: dst.len(),
        });
    }

    let tag = header.tag();
    dst[0] = tag;
    dst[TAG_SIZE..SIGNED_START].fill(0);
    let mut pos = SIGNED_START;

    if let Some(parent) = &header.parent {
        dst[pos..pos + SIGNATURE_SIZE].copy_from_slice(parent.as_bytes());
        pos += SIGNATURE_SIZE;
    }

    pos += encode_varint(&mut dst[pos..size], body.len() as u64)?;

    if let Some(author) = &header.author {
        dst[pos..pos + PUBLIC_KEY_SIZE].copy_from_slice(author.as_bytes());
        pos += PUBLIC_KEY_SIZE;
    }

    let body_offset = pos;
    dst[pos..pos + body.len()].copy_from_slice(body);

    Ok(BlockLayout {
        tag,
        size,
        body_offset,
        body_len: body.len(),
    })
}

/// One decoded segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Key(PublicKey),
    Block(BlockLayout),
}

impl Segment {
    /// Encoded size of the segment.
    pub fn size(&self) -> usize {
        match self {
            Segment::Key(_) => KEY_SEGMENT_SIZE,
            Segment::Block(layout) => layout.size,
        }
    }
}

/// Decode whatever segment starts at `offset`.
pub fn decode_segment(buf: &[u8], offset: usize) -> Result<Segment, CodecError> {
    match peek_kind(buf, offset)? {
        SegmentKind::Key => decode_key(buf, offset).map(Segment::Key),
        SegmentKind::Block => decode_block(buf, offset).map(Segment::Block),
    }
}
