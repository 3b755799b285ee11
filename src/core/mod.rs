//! # Core Framing Components
//!
//! Low-level framing pieces shared by the event-driven socket and the async
//! codec.
//!
//! ## Components
//! - **Frame**: wire constants and prefix encode/decode
//! - **Buffer**: fixed-capacity byte arena with front compaction
//! - **Codec**: Tokio codec for the same wire format
//!
//! ## Wire Format
//! ```text
//! [Length(2, big-endian)] [Payload(Length)]
//! ```
//!
//! ## Limits
//! - Maximum payload: 65534 bytes (64 KiB minus the prefix)
//! - Per-connection buffers hold exactly one maximal frame

pub mod buffer;
pub mod codec;
pub mod frame;
