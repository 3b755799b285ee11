//! # Frame Wire Format
//!
//! ```text
//! [Length(2, big-endian)] [Payload(Length)]
//! ```
//!
//! Frames are written back to back with no separator, version byte or
//! checksum; integrity and ordering come from the stream transport.

use crate::error::{Result, SocketError};

/// Width of the length prefix
pub const PKT_LEN_SIZE: usize = std::mem::size_of::<u16>();

/// Largest payload accepted by policy (64 KiB boundary minus the prefix)
pub const MAX_PACKET_SIZE: usize = 64 * 1024 - PKT_LEN_SIZE;

/// Capacity of each per-connection buffer: one maximal frame plus prefix
pub const BUF_SIZE: usize = MAX_PACKET_SIZE + PKT_LEN_SIZE;

/// Backlog passed to `listen()` when a listening socket is created
pub const LISTEN_BACKLOG: u32 = 5;

/// Buffer capacity needed to hold one frame of `max_packet_size` payload.
///
/// Sizes beyond [`MAX_PACKET_SIZE`] cannot be announced by the prefix and are
/// clamped, so the result never exceeds [`BUF_SIZE`].
#[inline]
pub const fn buffer_capacity(max_packet_size: usize) -> usize {
    if max_packet_size > MAX_PACKET_SIZE {
        BUF_SIZE
    } else {
        max_packet_size + PKT_LEN_SIZE
    }
}

/// Encode the length prefix for a payload of `len` bytes.
///
/// Fails with `MessageTooLarge` if `len` does not fit the prefix or exceeds
/// `max_packet_size`.
#[inline]
pub fn encode_prefix(len: usize, max_packet_size: usize) -> Result<[u8; PKT_LEN_SIZE]> {
    if len > max_packet_size || len > u16::MAX as usize {
        return Err(SocketError::MessageTooLarge(len));
    }
    Ok((len as u16).to_be_bytes())
}

/// Decode the payload length announced at the front of `buf`.
///
/// Returns `None` while fewer than [`PKT_LEN_SIZE`] bytes are available.
#[inline]
pub fn decode_prefix(buf: &[u8]) -> Option<usize> {
    match buf {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo]) as usize),
        _ => None,
    }
}

/// Total size of the first complete frame in `buf`, if one is present
#[inline]
pub fn complete_frame_len(buf: &[u8]) -> Option<usize> {
    let payload_len = decode_prefix(buf)?;
    let frame_len = PKT_LEN_SIZE + payload_len;
    (buf.len() >= frame_len).then_some(frame_len)
}

/// Build a complete frame (prefix + payload) as an owned byte vector
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let prefix = encode_prefix(payload.len(), MAX_PACKET_SIZE)?;
    let mut out = Vec::with_capacity(PKT_LEN_SIZE + payload.len());
    out.extend_from_slice(&prefix);
    out.extend_from_slice(payload);
    Ok(out)
}
