use bytes::{BufMut, BytesMut};
use proton_dtype::TypeDef;
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::Value;
use uuid::Uuid;

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::{CodecBuilder, hex_bytes, type_arg_text};
use crate::column_type::TypeRef;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;
use crate::registry::get_from_name;

/// `uuid`, as two little-endian `u64` halves, high half first.
#[derive(Debug)]
pub(crate) struct UuidCodec;

impl UuidCodec {
    fn encode(value: &Value) -> ProtonResult<u128> {
        Ok(match value {
            Value::Null => 0,
            Value::Uuid(u) => u.as_u128(),
            Value::String(s) => Uuid::parse_str(s.trim())?.as_u128(),
            Value::Bytes(b) => Uuid::from_slice(b)
                .map_err(|_| {
                    proton_err!(Data: "binary value {} is not a valid uuid", hex_bytes(b))
                })?
                .as_u128(),
            other => other.as_u128().ok_or_else(|| other.mismatch("uuid"))?,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn put(value: u128, dest: &mut BytesMut) {
        dest.put_u64_le((value >> 64) as u64);
        dest.put_u64_le(value as u64);
    }

    fn decode(halves: &[u8], format: Format) -> Value {
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&halves[..8]);
        low.copy_from_slice(&halves[8..]);
        let uuid = Uuid::from_u64_pair(u64::from_le_bytes(high), u64::from_le_bytes(low));
        match format {
            Format::String => Value::String(uuid.hyphenated().to_string()),
            _ => Value::Uuid(uuid),
        }
    }
}

impl TypeCodec for UuidCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::String]
    }

    fn byte_size(&self) -> Option<usize> {
        Some(16)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        Ok(source
            .read_fixed_col(rows, 16)?
            .iter()
            .map(|halves| Self::decode(halves, format))
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.reserve(column.len() * 16);
        for value in column {
            Self::put(Self::encode(value)?, dest);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        Self::decode(&[0; 16], format)
    }
}

/// `nothing`, the type of a bare `NULL`: always nullable, one placeholder byte per row.
#[derive(Debug)]
pub(crate) struct NothingCodec;

impl TypeCodec for NothingCodec {
    fn byte_size(&self) -> Option<usize> {
        Some(1)
    }

    fn forces_nullable(&self) -> bool {
        true
    }

    fn accepts_null(&self) -> bool {
        true
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        source.read_bytes(rows)?;
        Ok(vec![Value::Null; rows])
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.put_bytes(0x30, column.len());
        Ok(())
    }
}

/// `simple_aggregate_function(f, T)`, stored exactly as `T`.
#[derive(Debug)]
pub(crate) struct SimpleAggregateCodec {
    element: TypeRef,
    suffix: String,
}

impl TypeCodec for SimpleAggregateCodec {
    fn byte_size(&self) -> Option<usize> {
        self.element.byte_size()
    }

    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn accepts_null(&self) -> bool {
        self.element.nullable()
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        self.element.read_column_prefix(source, ctx)
    }

    fn write_prefix(&self, dest: &mut BytesMut, ctx: &InsertContext) -> ProtonResult<()> {
        self.element.write_column_prefix(dest, ctx)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        self.element.read_column_data(source, rows, ctx, state)
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        self.element.write_column_data(column, dest, ctx)
    }

    fn null_value(&self, format: Format) -> Value {
        self.element.codec().null_value(format)
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        self.element.data_size(sample)
    }
}

/// `aggregate_function(...)`, whose intermediate states can not be transferred.
#[derive(Debug)]
pub(crate) struct AggregateCodec {
    suffix: String,
}

impl TypeCodec for AggregateCodec {
    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn read_binary(
        &self,
        _source: &mut dyn ByteSource,
        _rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        proton_bail!(NotImplemented: "reading aggregate_function columns", "proton")
    }

    fn write_binary(
        &self,
        _column: &[Value],
        _dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        proton_bail!(NotImplemented: "writing aggregate_function columns", "proton")
    }
}

fn uuid(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(UuidCodec))
}

fn nothing(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(NothingCodec))
}

fn simple_aggregate_function(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let element = get_from_name(type_arg_text(def, 1, "simple_aggregate_function")?)?;
    Ok(Box::new(SimpleAggregateCodec {
        element,
        suffix: def.arg_str(),
    }))
}

fn aggregate_function(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(AggregateCodec {
        suffix: def.arg_str(),
    }))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "uuid" => uuid,
        "nothing" => nothing,
        "simpleaggregatefunction" => simple_aggregate_function,
        "aggregatefunction" => aggregate_function,
    ]
}
