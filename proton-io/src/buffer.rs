use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{trace, warn};
use proton_error::{ProtonError, ProtonResult, proton_bail, proton_err};

use crate::source::ChunkSource;
use crate::wire::WireNative;

/// Default read-ahead budget of a [`ResponseBuffer`].
pub const DEFAULT_BUFFER_SIZE: usize = 10 << 20;

/// Typed, incremental reads over a response body.
///
/// A read that runs past the end of the stream fails with
/// [`StreamComplete`][proton_error::ProtonError::StreamComplete].
pub trait ByteSource {
    /// Read exactly `len` bytes.
    fn read_bytes(&mut self, len: usize) -> ProtonResult<Bytes>;

    fn read_byte(&mut self) -> ProtonResult<u8>;

    /// True if the stream ended cleanly at the current position.
    ///
    /// A transport failure after the last complete value is returned here rather than being
    /// mistaken for a clean end.
    fn at_end(&mut self) -> ProtonResult<bool>;

    /// The most recently received chunk of the body, used to recover the server's error text
    /// when a stream ends early.
    fn last_message(&self) -> Option<Bytes>;

    /// Release the underlying transport. Further reads fail.
    fn close(&mut self);

    fn read_leb128(&mut self) -> ProtonResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 {
                proton_bail!(Protocol: "LEB128 value exceeds 64 bits");
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_leb128_str(&mut self) -> ProtonResult<String> {
        let len = self.read_leb128()?;
        let bytes = self.read_bytes(wire_len(len)?)?;
        Ok(decode_utf8(bytes))
    }

    fn read_uint64(&mut self) -> ProtonResult<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_slice(&bytes))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, len: usize) -> ProtonResult<Bytes> {
        S::read_bytes(self, len)
    }

    fn read_byte(&mut self) -> ProtonResult<u8> {
        S::read_byte(self)
    }

    fn at_end(&mut self) -> ProtonResult<bool> {
        S::at_end(self)
    }

    fn last_message(&self) -> Option<Bytes> {
        S::last_message(self)
    }

    fn close(&mut self) {
        S::close(self)
    }
}

/// Column level reads built from the primitive reads of a [`ByteSource`].
pub trait ByteSourceExt: ByteSource {
    /// Read `count` fixed width values.
    fn read_array<T: WireNative>(&mut self, count: usize) -> ProtonResult<Vec<T>> {
        let bytes = self.read_bytes(count * T::WIDTH)?;
        Ok(bytes.chunks_exact(T::WIDTH).map(T::from_le_slice).collect())
    }

    /// Read `count` length prefixed strings, replacing invalid UTF-8.
    fn read_str_col(&mut self, count: usize) -> ProtonResult<Vec<String>> {
        (0..count).map(|_| self.read_leb128_str()).collect()
    }

    /// Read `count` length prefixed byte strings.
    fn read_bytes_col(&mut self, count: usize) -> ProtonResult<Vec<Bytes>> {
        (0..count)
            .map(|_| {
                let len = self.read_leb128()?;
                self.read_bytes(wire_len(len)?)
            })
            .collect()
    }

    /// Read `count` values of `width` bytes each.
    fn read_fixed_col(&mut self, count: usize, width: usize) -> ProtonResult<Vec<Bytes>> {
        let mut data = self.read_bytes(count * width)?;
        Ok((0..count).map(|_| data.split_to(width)).collect())
    }
}

impl<S: ByteSource + ?Sized> ByteSourceExt for S {}

fn wire_len(len: u64) -> ProtonResult<usize> {
    usize::try_from(len).map_err(|_| proton_err!(Protocol: "length {len} does not fit in memory"))
}

/// Decode UTF-8, replacing invalid sequences.
pub fn decode_utf8(bytes: Bytes) -> String {
    match String::from_utf8(Vec::from(bytes)) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// A [`ByteSource`] over a queue of chunks pulled from a [`ChunkSource`].
///
/// When the queue runs dry the buffer reads ahead until it holds at least `buffer_size` bytes or
/// the stream ends. Reads that fit in the front chunk are zero copy. A failure of the source is
/// held until the bytes received before it are consumed, then returned by the next read. The
/// source is closed when the buffer is closed or dropped.
pub struct ResponseBuffer<S: ChunkSource> {
    source: Option<S>,
    chunks: VecDeque<Bytes>,
    buffered: usize,
    buffer_size: usize,
    done: bool,
    failure: Option<ProtonError>,
    last_message: Option<Bytes>,
}

impl<S: ChunkSource> ResponseBuffer<S> {
    pub fn new(source: S) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(source: S, buffer_size: usize) -> Self {
        Self {
            source: Some(source),
            chunks: VecDeque::new(),
            buffered: 0,
            buffer_size,
            done: false,
            failure: None,
            last_message: None,
        }
    }

    /// Bytes received and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    fn fill(&mut self, need: usize) {
        if self.buffered >= need || self.done {
            return;
        }
        let Some(source) = self.source.as_mut() else {
            self.done = true;
            return;
        };
        loop {
            match source.next_chunk() {
                Ok(Some(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.buffered += chunk.len();
                    self.last_message = Some(chunk.clone());
                    self.chunks.push_back(chunk);
                    if self.buffered >= need && self.buffered >= self.buffer_size {
                        break;
                    }
                }
                Ok(None) => {
                    trace!("response stream complete");
                    self.done = true;
                    break;
                }
                Err(e) => {
                    warn!("unexpected failure to read next chunk: {e}");
                    self.failure = Some(e);
                    self.done = true;
                    break;
                }
            }
        }
    }

    fn ensure(&mut self, need: usize) -> ProtonResult<()> {
        self.fill(need);
        if self.buffered < need {
            if let Some(failure) = self.failure.take() {
                return Err(failure);
            }
            proton_bail!(
                StreamComplete: "needed {need} bytes but only {} remained",
                self.buffered
            );
        }
        Ok(())
    }
}

impl<S: ChunkSource> ByteSource for ResponseBuffer<S> {
    fn read_bytes(&mut self, len: usize) -> ProtonResult<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.ensure(len)?;
        self.buffered -= len;
        if let Some(front) = self.chunks.front_mut() {
            if front.len() > len {
                return Ok(front.split_to(len));
            }
            if front.len() == len {
                return Ok(self.chunks.pop_front().unwrap_or_default());
            }
        }
        let mut out = BytesMut::with_capacity(len);
        while out.len() < len {
            let Some(mut chunk) = self.chunks.pop_front() else {
                proton_bail!(StreamComplete: "response buffer lost {} bytes", len - out.len());
            };
            let take = chunk.len().min(len - out.len());
            out.put(chunk.split_to(take));
            if !chunk.is_empty() {
                self.chunks.push_front(chunk);
            }
        }
        Ok(out.freeze())
    }

    fn read_byte(&mut self) -> ProtonResult<u8> {
        self.ensure(1)?;
        let Some(front) = self.chunks.front_mut() else {
            proton_bail!(StreamComplete: "response buffer is empty");
        };
        let byte = front.get_u8();
        if front.is_empty() {
            self.chunks.pop_front();
        }
        self.buffered -= 1;
        Ok(byte)
    }

    fn at_end(&mut self) -> ProtonResult<bool> {
        self.fill(1);
        if self.buffered > 0 {
            return Ok(false);
        }
        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(true),
        }
    }

    fn last_message(&self) -> Option<Bytes> {
        self.last_message.clone()
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.chunks.clear();
        self.buffered = 0;
        self.done = true;
    }
}

impl<S: ChunkSource> Drop for ResponseBuffer<S> {
    fn drop(&mut self) {
        self.close();
    }
}
