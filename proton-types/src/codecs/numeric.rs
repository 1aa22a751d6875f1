use std::fmt::{Debug, Display};
use std::marker::PhantomData;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use proton_dtype::TypeDef;
use proton_error::{ProtonResult, proton_bail};
use proton_io::wire::{WireNative, write_array};
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::Value;

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::CodecBuilder;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

const INT_FORMATS: &[Format] = &[Format::Native, Format::String];
const UINT64_FORMATS: &[Format] = &[Format::Native, Format::Signed, Format::String];

/// An integer type stored at its native width.
pub(crate) trait IntNative: WireNative + Display + FromStr + Default + Debug {
    const NAME: &'static str;
    const FORMATS: &'static [Format] = INT_FORMATS;

    fn to_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    /// The value reinterpreted as signed, for the `signed` format.
    fn to_signed(self) -> Option<Value> {
        None
    }

    /// A signed value reinterpreted as unsigned, for the `signed` format.
    fn from_signed(_value: &Value) -> Option<Self> {
        None
    }
}

macro_rules! int_native {
    ($T:ty, $name:literal, $variant:ident, $as:ident) => {
        impl IntNative for $T {
            const NAME: &'static str = $name;

            fn to_value(self) -> Value {
                Value::$variant(self.into())
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.$as()
            }
        }
    };
}

int_native!(i8, "int8", Int, as_i8);
int_native!(i16, "int16", Int, as_i16);
int_native!(i32, "int32", Int, as_i32);
int_native!(i64, "int64", Int, as_i64);
int_native!(u8, "uint8", UInt, as_u8);
int_native!(u16, "uint16", UInt, as_u16);
int_native!(u32, "uint32", UInt, as_u32);
int_native!(i128, "int128", Int128, as_i128);
int_native!(u128, "uint128", UInt128, as_u128);

impl IntNative for u64 {
    const NAME: &'static str = "uint64";
    const FORMATS: &'static [Format] = UINT64_FORMATS;

    fn to_value(self) -> Value {
        Value::UInt(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }

    fn to_signed(self) -> Option<Value> {
        Some(Value::Int(i64::from_le_bytes(self.to_le_bytes())))
    }

    fn from_signed(value: &Value) -> Option<Self> {
        value
            .as_i64()
            .map(|signed| u64::from_le_bytes(signed.to_le_bytes()))
    }
}

/// Fixed width integers, `int8` through `uint128`.
#[derive(Debug, Default)]
pub(crate) struct IntCodec<T> {
    _native: PhantomData<T>,
}

impl<T: IntNative> IntCodec<T> {
    fn encode(value: &Value, format: Format) -> ProtonResult<T> {
        if value.is_null() {
            return Ok(T::default());
        }
        if format == Format::Signed {
            if let Some(v) = T::from_signed(value) {
                return Ok(v);
            }
        }
        T::from_value(value)
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| value.mismatch(T::NAME))
    }
}

impl<T: IntNative> TypeCodec for IntCodec<T> {
    fn valid_formats(&self) -> &'static [Format] {
        T::FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(T::WIDTH)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let values = source.read_array::<T>(rows)?;
        Ok(match format {
            Format::String => values.into_iter().map(|v| Value::String(v.to_string())).collect(),
            Format::Signed => values
                .into_iter()
                .map(|v| v.to_signed().unwrap_or_else(|| v.to_value()))
                .collect(),
            _ => values.into_iter().map(T::to_value).collect(),
        })
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        format: Format,
    ) -> ProtonResult<()> {
        let values = column
            .iter()
            .map(|v| Self::encode(v, format))
            .collect::<ProtonResult<Vec<T>>>()?;
        write_array(&values, dest);
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String(String::new()),
            Format::Signed => T::default().to_signed().unwrap_or_else(|| T::default().to_value()),
            _ => T::default().to_value(),
        }
    }
}

/// A float type stored at its native width.
pub(crate) trait FloatNative: WireNative + Display + Default + Debug {
    const NAME: &'static str;

    fn to_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FloatNative for f32 {
    const NAME: &'static str = "float32";

    fn to_value(self) -> Value {
        Value::Float32(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float32(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_f64().map(|v| v as f32),
        }
    }
}

impl FloatNative for f64 {
    const NAME: &'static str = "float64";

    fn to_value(self) -> Value {
        Value::Float64(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_f64(),
        }
    }
}

/// `float32` and `float64`.
#[derive(Debug, Default)]
pub(crate) struct FloatCodec<T> {
    _native: PhantomData<T>,
}

impl<T: FloatNative> TypeCodec for FloatCodec<T> {
    fn valid_formats(&self) -> &'static [Format] {
        INT_FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(T::WIDTH)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let values = source.read_array::<T>(rows)?;
        Ok(match format {
            Format::String => values.into_iter().map(|v| Value::String(v.to_string())).collect(),
            _ => values.into_iter().map(T::to_value).collect(),
        })
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let values = column
            .iter()
            .map(|v| match v {
                Value::Null => Ok(T::default()),
                v => T::from_value(v).ok_or_else(|| v.mismatch(T::NAME)),
            })
            .collect::<ProtonResult<Vec<T>>>()?;
        write_array(&values, dest);
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String(String::new()),
            _ => T::default().to_value(),
        }
    }
}

/// `bool`, one byte per value.
#[derive(Debug)]
pub(crate) struct BoolCodec;

impl TypeCodec for BoolCodec {
    fn byte_size(&self) -> Option<usize> {
        Some(1)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let bytes = source.read_bytes(rows)?;
        Ok(bytes.iter().map(|b| Value::Bool(*b != 0)).collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.reserve(column.len());
        for value in column {
            let flag = match value {
                Value::Null => false,
                Value::Bool(v) => *v,
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => proton_bail!(Data: "string value `{s}` is not valid for column type bool"),
                },
                other => other.as_i128().map(|v| v != 0).ok_or_else(|| other.mismatch("bool"))?,
            };
            dest.put_u8(u8::from(flag));
        }
        Ok(())
    }

    fn null_value(&self, _format: Format) -> Value {
        Value::Bool(false)
    }
}

fn int<T: IntNative>(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(IntCodec::<T>::default()))
}

fn float<T: FloatNative>(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(FloatCodec::<T>::default()))
}

fn boolean(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(BoolCodec))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "int8" => int::<i8>,
        "int16" => int::<i16>,
        "int32" => int::<i32>,
        "int64" => int::<i64>,
        "int128" => int::<i128>,
        "uint8" => int::<u8>,
        "uint16" => int::<u16>,
        "uint32" => int::<u32>,
        "uint64" => int::<u64>,
        "uint128" => int::<u128>,
        "float32" => float::<f32>,
        "float64" => float::<f64>,
        "bool" => boolean,
        "boolean" => boolean,
    ]
}
