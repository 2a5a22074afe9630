//! Self-delimiting JSON framing
//!
//! One JSON object per message. A single read may carry several objects
//! back to back, or only part of one; the decoder pulls exactly one
//! complete object per call and leaves the rest buffered.
//!
//! Broken input never fails the stream. It is surfaced as
//! [`Frame::Malformed`] so the connection handler can answer and keep going.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::AppError;

/// Largest pending frame kept while waiting for the rest of it
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One decoded unit from the byte stream
#[derive(Debug, PartialEq)]
pub enum Frame<T> {
    Message(T),
    /// Input was skipped; carries a human-readable reason
    Malformed(String),
}

/// JSON codec for messages of type `T`
pub struct JsonCodec<T> {
    max_frame_len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = Frame<T>;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Drop inter-frame whitespace (newlines from our own encoder)
        let Some(start) = src.iter().position(|b| !b.is_ascii_whitespace()) else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        let (next, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&src[..]).into_iter::<serde_json::Value>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            None => Ok(None),
            Some(Ok(value)) => {
                src.advance(consumed);
                match serde_json::from_value::<T>(value) {
                    Ok(item) => Ok(Some(Frame::Message(item))),
                    Err(e) => Ok(Some(Frame::Malformed(e.to_string()))),
                }
            }
            Some(Err(e)) if e.is_eof() => {
                if src.len() > self.max_frame_len {
                    let len = src.len();
                    src.clear();
                    warn!("Discarding oversized frame ({} bytes)", len);
                    return Ok(Some(Frame::Malformed(format!(
                        "frame exceeds {} bytes",
                        self.max_frame_len
                    ))));
                }
                Ok(None)
            }
            Some(Err(e)) => {
                let skip = resync_point(&src[..]);
                src.advance(skip);
                Ok(Some(Frame::Malformed(e.to_string())))
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => {
                let len = buf.len();
                buf.clear();
                Ok(Some(Frame::Malformed(format!(
                    "connection closed inside a frame ({} bytes pending)",
                    len
                ))))
            }
        }
    }
}

/// Length of the broken frame at the head of `buf`
///
/// The frame ends where its outermost brackets balance, at the next
/// newline, or just before the next top-level `{`, whichever comes first.
/// Always at least one byte for a non-empty buffer.
fn resync_point(buf: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        // Raw newlines are never valid inside a JSON string
        if b == b'\n' {
            return i + 1;
        }
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                if depth == 0 && i > 0 {
                    return i;
                }
                depth += 1;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    buf.len()
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = AppError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
