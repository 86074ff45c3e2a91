//! Wire protocol: envelopes, control verbs and length-prefixed framing

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::{
    decode, decode_available, decode_body, encode, encode_with_limit, DecodedBatch, DecodedFrame,
    FrameDecoder, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN,
};
pub use envelope::{is_control_type, Control, Envelope, SUBSCRIBE_TYPE, UNSUBSCRIBE_TYPE};
pub use error::{DecodeError, EncodeError};
