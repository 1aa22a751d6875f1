use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use proton_error::{ProtonError, ProtonResult};

/// Default size of the chunks pulled from a [`Read`] transport.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// The transport boundary: a pull-based stream of raw response chunks.
///
/// Implementations wrap whatever carries the response body, an HTTP client stream, a socket or a
/// file. A chunk source is consumed by a single reader and must be closed exactly once when the
/// reader is done with it, whether or not the stream was read to the end.
pub trait ChunkSource: Send {
    /// The next chunk of the body, or `None` at the end of the stream.
    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>>;

    /// Drain and release the underlying transport.
    fn close(&mut self) {}
}

impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
        S::next_chunk(self)
    }

    fn close(&mut self) {
        S::close(self)
    }
}

/// A [`ChunkSource`] over an iterator of in-memory chunks.
pub struct ChunkIter<I> {
    chunks: I,
}

impl<I> ChunkIter<I>
where
    I: Iterator<Item = Bytes> + Send,
{
    pub fn new(chunks: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

impl<I> ChunkSource for ChunkIter<I>
where
    I: Iterator<Item = Bytes> + Send,
{
    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
        Ok(self.chunks.next())
    }
}

/// A [`ChunkSource`] pulling fixed size chunks from a blocking reader.
pub struct ReadSource<R> {
    reader: Option<R>,
    chunk_size: usize,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl<R: Read + Send> ChunkSource for ReadSource<R> {
    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let read = loop {
            match reader.read(&mut buf) {
                Ok(read) => break read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if read == 0 {
            self.reader = None;
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf.freeze()))
    }

    fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            // drain what is left so the connection can be reused
            let _ = io::copy(&mut reader, &mut io::sink());
        }
    }
}

/// Adapts a [`ChunkSource`] to [`Read`], for the streaming decoders.
pub(crate) struct ChunkReader<S> {
    source: S,
    current: Bytes,
}

impl<S: ChunkSource> ChunkReader<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            current: Bytes::new(),
        }
    }

    pub(crate) fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: ChunkSource> Read for ChunkReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.source.next_chunk().map_err(into_io)? {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
        let len = buf.len().min(self.current.len());
        buf[..len].copy_from_slice(&self.current[..len]);
        self.current.advance(len);
        Ok(len)
    }
}

fn into_io(err: ProtonError) -> io::Error {
    match err {
        ProtonError::IOError(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn read_source_chunks() {
        let mut source = ReadSource::with_chunk_size(Cursor::new(b"0123456789".to_vec()), 4);
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"0123");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"4567");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"89");
        assert!(source.next_chunk().unwrap().is_none());
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn chunk_reader_spans_chunks() {
        let source = ChunkIter::new(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cde")]);
        let mut reader = ChunkReader::new(source);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcde");
    }
}
