//! Text frame codec.
//!
//! One frame is one characteristic value: no length prefix, no envelope.
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ ATT header (3B)      │ UTF-8 text (≤ mtu − 3 B)    │
//! │ owned by the stack   │ what this module produces   │
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! Outbound text longer than the payload ceiling is cut at the byte
//! boundary (a multi-byte character may be split); inbound bytes are
//! converted lossily and never rejected.

use std::borrow::Cow;

/// ATT notification header size subtracted from the MTU.
pub const ATT_HEADER_LEN: usize = 3;

/// Minimum ATT MTU guaranteed by every BLE link.
pub const DEFAULT_MTU: u16 = 23;

/// Largest MTU the engine asks the stack for.
pub const MAX_MTU: u16 = 512;

/// Largest single frame payload the codec can ever yield.
pub const MAX_PAYLOAD: usize = MAX_MTU as usize - ATT_HEADER_LEN;

/// An outbound frame, borrowing the caller's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
    truncated: bool,
    dropped: usize,
}

impl<'a> Frame<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` if the source text did not fit in one frame.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of bytes cut off the end of the source text.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Payload ceiling for a negotiated MTU. MTUs below 23 are treated as 23.
pub fn max_payload(mtu: u16) -> usize {
    usize::from(mtu.max(DEFAULT_MTU)) - ATT_HEADER_LEN
}

/// Build the frame for `text` under `mtu`.
pub fn encode(text: &str, mtu: u16) -> Frame<'_> {
    let limit = max_payload(mtu);
    let bytes = text.as_bytes();
    if bytes.len() <= limit {
        Frame {
            bytes,
            truncated: false,
            dropped: 0,
        }
    } else {
        Frame {
            bytes: &bytes[..limit],
            truncated: true,
            dropped: bytes.len() - limit,
        }
    }
}

/// Interpret an inbound characteristic value as text.
///
/// Returns `None` for an empty write; invalid UTF-8 sequences become
/// U+FFFD.
pub fn decode(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(bytes))
}
