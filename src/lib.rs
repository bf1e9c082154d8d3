//! archbit: length-framed binary archives for typed values
//!
//! This crate converts values into a compact, length-framed byte stream and
//! reconstructs them symmetrically, either fully in memory or incrementally
//! against a file or any other `std::io` channel.
//!
//! # Wire Format
//!
//! ```text
//! scalar / str / bytes   +-----------+------------------+
//!                        | Len u32   | Len raw bytes    |
//!                        +-----------+------------------+
//! sequence / set / map   +-----------+------------------------------+
//!                        | Count u32 | Count framed elements        |
//!                        +-----------+------------------------------+
//! pair / composite       framed members back to back, no prefix
//! ```
//!
//! Prefixes and scalar payloads use the host's native byte order and width.
//! Archives are therefore only portable between machines that agree on both.
//!
//! # Storage
//!
//! - Every archive embeds a fixed scratch region; small archives never allocate
//! - Larger archives spill into a heap buffer grown by 1.5x
//! - An encoder with a sink flushes scratch then heap to the channel
//! - A decoder with a source refills its scratch on demand, so records may
//!   straddle scratch, heap and unread channel bytes
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use archbit::{composite, Decoder, Encoder};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Message {
//!     id: i32,
//!     text: String,
//!     table: BTreeMap<i32, String>,
//! }
//!
//! composite!(Message { id, text, table });
//!
//! let mut msg = Message { id: 1, text: "test".into(), ..Default::default() };
//! msg.table.insert(11, "123".into());
//!
//! let mut encoder = Encoder::new();
//! encoder.append(&msg)?;
//!
//! let mut decoder = Decoder::from_encoder(&encoder)?;
//! let copy: Message = decoder.extract()?;
//! assert_eq!(copy, msg);
//! # Ok::<(), archbit::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
mod region;

// Re-export main types
pub use codec::{Composite, Decode, Encode, Scalar};
pub use config::ArchiveConfig;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, ErrorKind, FramingFault, Result};

/// Capacity of the inline scratch region (40 KiB)
pub const SCRATCH_CAPACITY: usize = 40 * 1024;

/// Size of every length and count prefix
pub const PREFIX_SIZE: usize = 4;

/// Encode `value` into a freshly allocated byte vector
pub fn to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.append(value)?;
    Ok(encoder.to_vec())
}

/// Decode one `T` from the start of `bytes`
///
/// Trailing bytes after the value are ignored.
pub fn from_slice<T: Decode>(bytes: &[u8]) -> Result<T> {
    Decoder::from_bytes(bytes)?.extract()
}
