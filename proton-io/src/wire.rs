//! Primitive encodings of the native format: little-endian fixed width values and
//! LEB128 varints.

use bytes::{BufMut, BytesMut};

/// A fixed width value stored little-endian on the wire.
pub trait WireNative: Copy + Send + Sync + 'static {
    /// The encoded width in bytes.
    const WIDTH: usize;

    /// Decode from exactly [`Self::WIDTH`] bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the encoded value.
    fn put_le(&self, out: &mut BytesMut);
}

macro_rules! wire_native {
    ($($T:ty),+) => {
        $(
            impl WireNative for $T {
                const WIDTH: usize = size_of::<$T>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$T>()];
                    buf.copy_from_slice(bytes);
                    <$T>::from_le_bytes(buf)
                }

                #[inline]
                fn put_le(&self, out: &mut BytesMut) {
                    out.put_slice(&self.to_le_bytes());
                }
            }
        )+
    };
}

wire_native!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

/// Append an unsigned LEB128 varint.
#[allow(clippy::cast_possible_truncation)]
pub fn write_leb128(mut value: u64, out: &mut BytesMut) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.put_u8(byte);
            return;
        }
        out.put_u8(byte | 0x80);
    }
}

/// Append a LEB128 length prefixed byte string.
pub fn write_leb128_bytes(value: &[u8], out: &mut BytesMut) {
    write_leb128(value.len() as u64, out);
    out.put_slice(value);
}

/// Append a LEB128 length prefixed UTF-8 string.
pub fn write_leb128_str(value: &str, out: &mut BytesMut) {
    write_leb128_bytes(value.as_bytes(), out);
}

/// Append a slice of fixed width values.
pub fn write_array<T: WireNative>(values: &[T], out: &mut BytesMut) {
    out.reserve(values.len() * T::WIDTH);
    for value in values {
        value.put_le(out);
    }
}
