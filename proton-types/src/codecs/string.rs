use bytes::{Bytes, BytesMut};
use proton_dtype::TypeDef;
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::wire::{write_leb128, write_leb128_bytes};
use proton_io::{ByteSource, ByteSourceExt, decode_utf8};
use proton_scalar::Value;

use crate::codec::{ReadState, TypeCodec, average_size};
use crate::codecs::{CodecBuilder, hex_bytes, type_arg};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

/// `string`: LEB128 length prefixed bytes.
#[derive(Debug)]
pub(crate) struct StringCodec;

impl TypeCodec for StringCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::Bytes]
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        Ok(match format {
            Format::Bytes => source.read_bytes_col(rows)?.into_iter().map(Value::Bytes).collect(),
            _ => source.read_str_col(rows)?.into_iter().map(Value::String).collect(),
        })
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        for value in column {
            match value {
                Value::Null => write_leb128(0, dest),
                other => {
                    let bytes = other.as_bytes().ok_or_else(|| other.mismatch("string"))?;
                    write_leb128_bytes(bytes, dest);
                }
            }
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::Bytes => Value::Bytes(Bytes::new()),
            _ => Value::String(String::new()),
        }
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        average_size(sample, |v| v.as_bytes().map_or(0, <[u8]>::len)) + 1
    }
}

/// `fixed_string(N)`: exactly `N` bytes per value, zero padded.
#[derive(Debug)]
pub(crate) struct FixedStringCodec {
    size: usize,
}

impl FixedStringCodec {
    fn encode(&self, value: &Value, dest: &mut BytesMut) -> ProtonResult<()> {
        match value {
            Value::Null => dest.resize(dest.len() + self.size, 0),
            Value::String(s) => {
                if s.len() > self.size {
                    proton_bail!(
                        Data: "UTF-8 encoded fixed_string value {} exceeds column size {}",
                        hex_bytes(s.as_bytes()),
                        self.size
                    );
                }
                dest.extend_from_slice(s.as_bytes());
                dest.resize(dest.len() + self.size - s.len(), 0);
            }
            Value::Bytes(b) => {
                if b.len() != self.size {
                    proton_bail!(
                        Data: "Fixed String binary value {} does not match column size {}",
                        hex_bytes(b),
                        self.size
                    );
                }
                dest.extend_from_slice(b);
            }
            other => return Err(other.mismatch(&format!("fixed_string({})", self.size))),
        }
        Ok(())
    }
}

impl TypeCodec for FixedStringCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::String]
    }

    fn byte_size(&self) -> Option<usize> {
        Some(self.size)
    }

    fn name_suffix(&self) -> String {
        format!("({})", self.size)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let values = source.read_fixed_col(rows, self.size)?;
        Ok(match format {
            Format::String => values
                .into_iter()
                .map(|mut v| {
                    let len = v.iter().rposition(|b| *b != 0).map_or(0, |ix| ix + 1);
                    v.truncate(len);
                    Value::String(decode_utf8(v))
                })
                .collect(),
            _ => values.into_iter().map(Value::Bytes).collect(),
        })
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.reserve(column.len() * self.size);
        for value in column {
            self.encode(value, dest)?;
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String(String::new()),
            _ => Value::Bytes(Bytes::from(vec![0; self.size])),
        }
    }
}

fn string(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(StringCodec))
}

fn fixed_string(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let arg = type_arg(def, 0, "fixed_string")?;
    let size = arg
        .as_int()
        .and_then(|size| usize::try_from(size).ok())
        .filter(|size| *size > 0)
        .ok_or_else(|| proton_err!(Parse: "invalid fixed_string size `{arg}`"))?;
    Ok(Box::new(FixedStringCodec { size }))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "string" => string,
        "fixedstring" => fixed_string,
    ]
}
