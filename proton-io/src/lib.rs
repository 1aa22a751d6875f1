//! Byte level IO for the Proton native protocol.
//!
//! A response body arrives as a stream of chunks from some transport ([`ChunkSource`]), possibly
//! lz4 or zstd compressed ([`Decompressed`]). The [`ResponseBuffer`] queues those chunks and serves
//! the typed reads the column codecs need through [`ByteSource`]. The write side is plain
//! [`bytes::BytesMut`] plus the helpers in [`wire`].

pub use buffer::*;
pub use compress::*;
pub use source::*;
pub use wire::WireNative;

mod buffer;
mod compress;
mod source;
pub mod wire;
