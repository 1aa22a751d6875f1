//! Streaming lz4 and zstd filters for response bodies and insert payloads.

use std::io::{BufReader, Read, Write};

use bytes::{Bytes, BytesMut};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use proton_error::{ProtonResult, proton_bail, proton_err};

use crate::source::{ChunkReader, ChunkSource, DEFAULT_CHUNK_SIZE};

/// The content encoding of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Lz4,
    Zstd,
}

impl Compression {
    /// Resolve a `Content-Encoding` header value. Encodings other than lz4 and zstd are passed
    /// through untouched.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("lz4") => Compression::Lz4,
            Some("zstd") => Compression::Zstd,
            _ => Compression::None,
        }
    }

    /// Resolve a compression setting, failing on names that are not supported.
    pub fn from_name(name: &str) -> ProtonResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            other => proton_bail!(Config: "unsupported compression `{other}`"),
        }
    }

    /// The `Content-Encoding` header value, if any.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Lz4 => Some("lz4"),
            Compression::Zstd => Some("zstd"),
        }
    }
}

enum Decoder<S: ChunkSource> {
    Lz4(FrameDecoder<ChunkReader<S>>),
    Zstd(zstd::stream::read::Decoder<'static, BufReader<ChunkReader<S>>>),
}

/// A [`ChunkSource`] that decompresses another one as it is read.
///
/// Decoder state is carried across chunk boundaries, so frames may be split anywhere.
pub struct Decompressed<S: ChunkSource> {
    decoder: Option<Decoder<S>>,
    chunk_size: usize,
}

impl<S: ChunkSource> Decompressed<S> {
    pub fn new(source: S, compression: Compression) -> ProtonResult<Self> {
        let reader = ChunkReader::new(source);
        let decoder = match compression {
            Compression::Lz4 => Decoder::Lz4(FrameDecoder::new(reader)),
            Compression::Zstd => Decoder::Zstd(zstd::stream::read::Decoder::new(reader)?),
            Compression::None => {
                proton_bail!(Config: "no decompression filter for uncompressed data")
            }
        };
        Ok(Self {
            decoder: Some(decoder),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }
}

impl<S: ChunkSource> ChunkSource for Decompressed<S> {
    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let read = match decoder {
            Decoder::Lz4(d) => d.read(&mut buf)?,
            Decoder::Zstd(d) => d.read(&mut buf)?,
        };
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf.freeze()))
    }

    fn close(&mut self) {
        match self.decoder.take() {
            Some(Decoder::Lz4(mut d)) => d.get_mut().source_mut().close(),
            Some(Decoder::Zstd(mut d)) => d.get_mut().get_mut().source_mut().close(),
            None => {}
        }
    }
}

/// Wrap a source in the decompression filter for `compression`, if any.
pub fn decompressing<S: ChunkSource + 'static>(
    source: S,
    compression: Compression,
) -> ProtonResult<Box<dyn ChunkSource>> {
    Ok(match compression {
        Compression::None => Box::new(source),
        _ => Box::new(Decompressed::new(source, compression)?),
    })
}

enum Encoder {
    None,
    Lz4(FrameEncoder<Vec<u8>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

/// Compresses insert blocks into a single stream, block by block.
pub struct Compressor {
    encoder: Encoder,
}

const ZSTD_LEVEL: i32 = 1;

impl Compressor {
    pub fn new(compression: Compression) -> ProtonResult<Self> {
        let encoder = match compression {
            Compression::None => Encoder::None,
            Compression::Lz4 => Encoder::Lz4(FrameEncoder::new(Vec::new())),
            Compression::Zstd => {
                Encoder::Zstd(zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)?)
            }
        };
        Ok(Self { encoder })
    }

    /// Compress one block, returning everything the encoder emitted for it.
    pub fn compress_block(&mut self, block: Bytes) -> ProtonResult<Bytes> {
        match &mut self.encoder {
            Encoder::None => Ok(block),
            Encoder::Lz4(e) => {
                e.write_all(&block)?;
                e.flush()?;
                Ok(Bytes::from(std::mem::take(e.get_mut())))
            }
            Encoder::Zstd(e) => {
                e.write_all(&block)?;
                e.flush()?;
                Ok(Bytes::from(std::mem::take(e.get_mut())))
            }
        }
    }

    /// End the stream, returning the trailing footer if the encoding has one.
    pub fn finish(self) -> ProtonResult<Option<Bytes>> {
        let footer = match self.encoder {
            Encoder::None => return Ok(None),
            Encoder::Lz4(e) => e
                .finish()
                .map_err(|e| proton_err!(Protocol: "lz4 frame error: {e}"))?,
            Encoder::Zstd(e) => e.finish()?,
        };
        Ok((!footer.is_empty()).then(|| Bytes::from(footer)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::buffer::{ByteSource, ByteSourceExt, ResponseBuffer};
    use crate::source::ChunkIter;

    #[test]
    fn header_values() {
        assert_eq!(Compression::from_header(Some("lz4")), Compression::Lz4);
        assert_eq!(Compression::from_header(Some("ZSTD")), Compression::Zstd);
        assert_eq!(Compression::from_header(Some("gzip")), Compression::None);
        assert_eq!(Compression::from_header(None), Compression::None);
        assert!(Compression::from_name("brotli").is_err());
    }

    #[rstest]
    #[case(Compression::Lz4)]
    #[case(Compression::Zstd)]
    fn compressed_stream_split_anywhere(#[case] compression: Compression) {
        let mut compressor = Compressor::new(compression).unwrap();
        let mut stream = Vec::new();
        for block in 0..3u64 {
            let data: Vec<u8> = (0..1000u64).flat_map(|v| (v * block).to_le_bytes()).collect();
            stream.extend_from_slice(&compressor.compress_block(Bytes::from(data)).unwrap());
        }
        if let Some(footer) = compressor.finish().unwrap() {
            stream.extend_from_slice(&footer);
        }

        // feed the compressed body back in 7 byte pieces
        let pieces: Vec<Bytes> = stream.chunks(7).map(Bytes::copy_from_slice).collect();
        let source = decompressing(ChunkIter::new(pieces), compression).unwrap();
        let mut buf = ResponseBuffer::new(source);
        for block in 0..3u64 {
            let values = buf.read_array::<u64>(1000).unwrap();
            assert_eq!(values[999], 999 * block);
        }
        assert!(buf.at_end().unwrap());
    }
}
