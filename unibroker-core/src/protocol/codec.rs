//! Envelope framing
//!
//! Each envelope travels as a frame: a 4-byte big-endian body length
//! followed by the UTF-8 JSON body `{"type": ..., "entity": ...}`. The
//! length prefix makes a frame's end known from its first four bytes, so an
//! oversized declaration is rejected immediately instead of waiting for
//! bytes that may never arrive.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::protocol::{DecodeError, EncodeError, Envelope};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound for a frame body
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Encode an envelope into a frame using [`DEFAULT_MAX_FRAME_LEN`]
pub fn encode(envelope: &Envelope) -> Result<Bytes, EncodeError> {
    encode_with_limit(envelope, DEFAULT_MAX_FRAME_LEN)
}

/// Encode an envelope into a frame, rejecting bodies above `max_frame_len`
pub fn encode_with_limit(envelope: &Envelope, max_frame_len: usize) -> Result<Bytes, EncodeError> {
    let body = serde_json::to_vec(envelope).map_err(EncodeError::Serialize)?;
    let max = max_frame_len.min(u32::MAX as usize);
    if body.len() > max {
        return Err(EncodeError::FrameTooLarge {
            max,
            actual: body.len(),
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    Ok(buf.freeze())
}

/// Decode exactly one complete frame
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let total = match frame_len(bytes, usize::MAX)? {
        Some(total) => total,
        None => return Err(DecodeError::malformed("incomplete frame")),
    };
    if total != bytes.len() {
        return Err(DecodeError::malformed(format!(
            "trailing bytes after frame: {}",
            bytes.len() - total
        )));
    }
    decode_body(&bytes[LENGTH_PREFIX_LEN..])
}

/// Decode one JSON envelope body (no length prefix)
pub fn decode_body(body: &[u8]) -> Result<Envelope, DecodeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::malformed(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(DecodeError::malformed("envelope is not a JSON object"));
    };

    let message_type = match fields.remove("type") {
        Some(Value::String(message_type)) => message_type,
        Some(_) => return Err(DecodeError::malformed("'type' must be a string")),
        None => return Err(DecodeError::MissingField { field: "type" }),
    };
    if message_type.is_empty() {
        return Err(DecodeError::malformed("'type' must not be empty"));
    }

    let entity = fields
        .remove("entity")
        .ok_or(DecodeError::MissingField { field: "entity" })?;

    Ok(Envelope {
        message_type,
        entity,
    })
}

/// Total length of the frame at the start of `bytes`
///
/// `Ok(None)` means more bytes are needed.
fn frame_len(bytes: &[u8], max_frame_len: usize) -> Result<Option<usize>, DecodeError> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }
    let body_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if body_len > max_frame_len {
        return Err(DecodeError::FrameTooLarge {
            max: max_frame_len,
            actual: body_len,
        });
    }
    let total = LENGTH_PREFIX_LEN + body_len;
    if bytes.len() < total {
        return Ok(None);
    }
    Ok(Some(total))
}

/// Result of decoding as many frames as a buffer holds
#[derive(Debug, Default, PartialEq)]
pub struct DecodedBatch {
    /// Envelopes decoded in wire order
    pub envelopes: Vec<Envelope>,
    /// Bytes consumed by those envelopes; the caller keeps the rest
    pub consumed: usize,
    /// Set when decoding stopped at a bad frame
    pub error: Option<DecodeError>,
}

/// Decode every complete frame in `bytes`
///
/// A trailing partial frame is left unconsumed.
pub fn decode_available(bytes: &[u8], max_frame_len: usize) -> DecodedBatch {
    let mut batch = DecodedBatch::default();

    loop {
        let rest = &bytes[batch.consumed..];
        match frame_len(rest, max_frame_len) {
            Ok(Some(total)) => match decode_body(&rest[LENGTH_PREFIX_LEN..total]) {
                Ok(envelope) => {
                    batch.envelopes.push(envelope);
                    batch.consumed += total;
                }
                Err(e) => {
                    batch.error = Some(e);
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                batch.error = Some(e);
                break;
            }
        }
    }

    batch
}

/// A decoded envelope together with its original wire bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub envelope: Envelope,
    /// Length prefix and body, untouched
    pub frame: Bytes,
}

/// Incremental frame decoder owning the inbound buffer of one connection
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next complete envelope, if the buffer holds one
    pub fn decode_next(&mut self) -> Result<Option<Envelope>, DecodeError> {
        Ok(self.decode_next_frame()?.map(|decoded| decoded.envelope))
    }

    /// Like [`decode_next`](Self::decode_next), also handing back the frame
    /// exactly as it arrived
    pub fn decode_next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        let Some(total) = frame_len(&self.buffer, self.max_frame_len)? else {
            return Ok(None);
        };
        let frame = self.buffer.split_to(total).freeze();
        let envelope = decode_body(&frame[LENGTH_PREFIX_LEN..])?;
        Ok(Some(DecodedFrame { envelope, frame }))
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
