//! # Frame Codec
//!
//! `tokio_util` codec for the length-prefixed wire format, for peers that
//! talk to a [`PacketSocket`](crate::protocol::packet_socket::PacketSocket)
//! through `Framed<TcpStream, FrameCodec>` instead of an event loop.
//!
//! Unlike the event-driven reassembly path, the decoder rejects a prefix that
//! exceeds the configured maximum as soon as the prefix is visible.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{decode_prefix, encode_prefix, MAX_PACKET_SIZE, PKT_LEN_SIZE};
use crate::error::{Result, SocketError};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_packet_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    /// Codec with a smaller payload ceiling (clamped to the prefix width)
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: max_packet_size.min(u16::MAX as usize),
        }
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(payload_len) = decode_prefix(src) else {
            return Ok(None);
        };

        if payload_len > self.max_packet_size {
            return Err(SocketError::MessageTooLarge(payload_len));
        }

        let frame_len = PKT_LEN_SIZE + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(PKT_LEN_SIZE);
        Ok(Some(src.split_to(payload_len).freeze()))
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for FrameCodec {
    type Error = SocketError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let payload = item.as_ref();
        let prefix = encode_prefix(payload.len(), self.max_packet_size)?;
        dst.reserve(PKT_LEN_SIZE + payload.len());
        dst.put_slice(&prefix);
        dst.put_slice(payload);
        Ok(())
    }
}
