//! The one-byte batch protocol shared by the TCP and HTTP front ends.
//!
//! A request is a single unsigned byte `n`. The response is `n * 8` bytes:
//! each consecutive 8-byte chunk is one big-endian 64-bit ID, in generation
//! order. On a stream connection requests repeat until the peer closes.

use crate::common::{SNOWFLAKE_ID_SIZE, SnowflakeId};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// A request for `count` IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRequest {
    pub count: u8,
}

impl BatchRequest {
    /// Number of response bytes this request produces.
    pub fn response_len(&self) -> usize {
        self.count as usize * SNOWFLAKE_ID_SIZE
    }
}

/// Frames batch requests and responses on a byte stream.
///
/// Decoding yields one [`BatchRequest`] per input byte. Encoding writes IDs
/// big-endian, back to back.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchCodec;

impl Decoder for BatchCodec {
    type Item = BatchRequest;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(BatchRequest {
            count: src.get_u8(),
        }))
    }
}

impl Encoder<&[SnowflakeId]> for BatchCodec {
    type Error = io::Error;

    fn encode(&mut self, ids: &[SnowflakeId], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_ids(ids, dst);
        Ok(())
    }
}

/// Appends the big-endian encoding of `ids` to `dst`.
pub fn encode_ids(ids: &[SnowflakeId], dst: &mut BytesMut) {
    dst.reserve(ids.len() * SNOWFLAKE_ID_SIZE);
    for id in ids {
        dst.put_u64(id.to_raw());
    }
}

/// Splits a response body back into IDs. Trailing bytes that do not form a
/// whole ID are ignored.
pub fn decode_ids(mut src: &[u8]) -> Vec<SnowflakeId> {
    let mut ids = Vec::with_capacity(src.len() / SNOWFLAKE_ID_SIZE);
    while src.remaining() >= SNOWFLAKE_ID_SIZE {
        ids.push(SnowflakeId::from_raw(src.get_u64()));
    }
    ids
}
