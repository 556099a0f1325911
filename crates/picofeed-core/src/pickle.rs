//! Pickle: URL-safe text transport of feed bytes.
//!
//! ```text
//! pickle := "PIC0." (token chunk)*
//! token  := "K0." | "B0."
//! chunk  := base64url-nopad(key[32]) | base64url-nopad(block segment)
//! ```
//!
//! Every character is an unreserved URL character, so a pickle can be
//! dropped into a URL as is. Text in front of the marker is ignored.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::codec::{check_magic, decode_block, decode_segment, tag, Segment, HEADER_SIZE, MAGIC};
use crate::crypto::PUBLIC_KEY_SIZE;
use crate::error::{FeedError, Result};

/// Marker that starts every pickle.
pub const PICKLE_MARKER: &str = "PIC0.";

/// Token in front of a key chunk.
pub const KEY_TOKEN: &str = "K0";

/// Token in front of a block chunk.
pub const BLOCK_TOKEN: &str = "B0";

const SEPARATOR: char = '.';

/// Pickle feed wire bytes.
pub fn encode(bytes: &[u8]) -> Result<String> {
    check_magic(bytes)?;

    let mut out = String::from(PICKLE_MARKER);
    let mut pos = HEADER_SIZE;
    while pos < bytes.len() {
        let segment = decode_segment(bytes, pos)?;
        let end = pos + segment.size();
        match segment {
            Segment::Key(key) => {
                out.push_str(KEY_TOKEN);
                out.push(SEPARATOR);
                URL_SAFE_NO_PAD.encode_string(key.as_bytes(), &mut out);
            }
            Segment::Block(_) => {
                out.push_str(BLOCK_TOKEN);
                out.push(SEPARATOR);
                URL_SAFE_NO_PAD.encode_string(&bytes[pos..end], &mut out);
            }
        }
        pos = end;
    }
    Ok(out)
}

/// Rebuild feed wire bytes from a pickle.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let start = text.find(PICKLE_MARKER).ok_or(FeedError::NotPickle)?;
    let rest = &text[start + PICKLE_MARKER.len()..];

    let mut bytes = MAGIC.to_vec();
    if rest.is_empty() {
        return Ok(bytes);
    }

    // Pieces look like: token, chunk+token, ..., chunk.
    let mut pieces = rest.split(SEPARATOR);
    let mut token = pieces.next().unwrap_or_default();
    let mut pieces = pieces.peekable();

    while let Some(piece) = pieces.next() {
        let is_last = pieces.peek().is_none();
        let (chunk, next) = if is_last {
            (piece, "")
        } else {
            let split = piece.len().checked_sub(2).filter(|at| piece.is_char_boundary(*at));
            let Some(split) = split else {
                return Err(FeedError::MalformedPickle(format!(
                    "chunk too short for a token: {piece:?}"
                )));
            };
            piece.split_at(split)
        };

        let raw = URL_SAFE_NO_PAD
            .decode(chunk)
            .map_err(|err| FeedError::MalformedPickle(err.to_string()))?;

        match token {
            KEY_TOKEN => {
                if raw.len() != PUBLIC_KEY_SIZE {
                    return Err(FeedError::MalformedPickle(format!(
                        "key chunk is {} bytes",
                        raw.len()
                    )));
                }
                bytes.push(tag::KEY);
                bytes.extend_from_slice(&raw);
            }
            BLOCK_TOKEN => {
                let layout = decode_block(&raw, 0)
                    .map_err(|err| FeedError::MalformedPickle(err.to_string()))?;
                if layout.size != raw.len() {
                    return Err(FeedError::MalformedPickle(format!(
                        "block chunk is {} bytes, segment is {}",
                        raw.len(),
                        layout.size
                    )));
                }
                bytes.extend_from_slice(&raw);
            }
            other => {
                return Err(FeedError::MalformedPickle(format!(
                    "unknown token {other:?}"
                )));
            }
        }
        token = next;
    }

    if !token.is_empty() {
        return Err(FeedError::MalformedPickle(format!(
            "token {token:?} without a chunk"
        )));
    }
    Ok(bytes)
}
