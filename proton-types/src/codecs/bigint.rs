use bytes::BytesMut;
use proton_dtype::TypeDef;
use proton_error::ProtonResult;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::{U256, Value, i256, i256_to_string, parse_i256};

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::CodecBuilder;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

const FORMATS: &[Format] = &[Format::Native, Format::String];

/// `int256` and `uint256`, 32 little-endian bytes per value.
#[derive(Debug)]
pub(crate) struct Int256Codec {
    signed: bool,
}

impl Int256Codec {
    fn type_name(&self) -> &'static str {
        if self.signed { "int256" } else { "uint256" }
    }

    fn decode(&self, bytes: [u8; 32], format: Format) -> Value {
        match (self.signed, format) {
            (true, Format::String) => Value::String(i256_to_string(i256::from_le_bytes(bytes))),
            (true, _) => Value::Int256(i256::from_le_bytes(bytes)),
            (false, Format::String) => Value::String(U256::from_le_bytes(bytes).to_string()),
            (false, _) => Value::UInt256(U256::from_le_bytes(bytes)),
        }
    }

    fn encode(&self, value: &Value) -> ProtonResult<[u8; 32]> {
        let mismatch = || value.mismatch(self.type_name());
        if self.signed {
            let v = match value {
                Value::Null => i256::ZERO,
                Value::Int256(v) => *v,
                Value::String(s) => parse_i256(s.trim()).map_err(|_| mismatch())?,
                other => other.as_i128().map(i256::from_i128).ok_or_else(mismatch)?,
            };
            Ok(v.to_le_bytes())
        } else {
            let v = match value {
                Value::Null => U256::ZERO,
                Value::UInt256(v) => *v,
                Value::String(s) => s.trim().parse::<U256>().map_err(|_| mismatch())?,
                other => other.as_u128().map(U256::from).ok_or_else(mismatch)?,
            };
            Ok(v.to_le_bytes())
        }
    }
}

impl TypeCodec for Int256Codec {
    fn valid_formats(&self) -> &'static [Format] {
        FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(32)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let data = source.read_fixed_col(rows, 32)?;
        Ok(data
            .iter()
            .map(|chunk| {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(chunk);
                self.decode(bytes, format)
            })
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.reserve(column.len() * 32);
        for value in column {
            dest.extend_from_slice(&self.encode(value)?);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        self.decode([0; 32], format)
    }
}

fn int256(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(Int256Codec { signed: true }))
}

fn uint256(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(Int256Codec { signed: false }))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "int256" => int256,
        "uint256" => uint256,
    ]
}
