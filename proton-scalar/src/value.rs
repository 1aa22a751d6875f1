use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use jiff::Zoned;
use jiff::civil::{Date, DateTime};
use num_traits::NumCast;
use paste::paste;
use proton_error::{ProtonError, ProtonResult, proton_err};
use uuid::Uuid;

use crate::bigint::{U256, i256};
use crate::decimal::Decimal;
use crate::literal::format_bind_value;

/// A single decoded column value.
///
/// Integers up to 64 bits share the [`Value::Int`] and [`Value::UInt`] variants regardless of the
/// column width; wider integers keep their own variants so nothing is lost in a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Int128(i128),
    UInt128(u128),
    Int256(i256),
    UInt256(U256),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Bytes),
    Decimal(Decimal),
    Date(Date),
    /// A naive date time, in UTC.
    DateTime(DateTime),
    Zoned(Zoned),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    /// Map entries in wire order.
    Map(Vec<(Value, Value)>),
    /// Named fields in declaration order, used for nested rows and JSON objects.
    Object(Vec<(String, Value)>),
    Json(serde_json::Value),
}

macro_rules! as_primitive {
    ($T:ty) => {
        paste! {
            #[doc = "Access the value as `" $T "`, returning `None` if it is not an integer or "
                "does not fit"]
            pub fn [<as_ $T>](&self) -> Option<$T> {
                match self {
                    Value::Bool(v) => Some(<$T as From<bool>>::from(*v)),
                    Value::Int(v) => <$T as NumCast>::from(*v),
                    Value::UInt(v) => <$T as NumCast>::from(*v),
                    Value::Int128(v) => <$T as NumCast>::from(*v),
                    Value::UInt128(v) => <$T as NumCast>::from(*v),
                    Value::Int256(v) => v.to_i128().and_then(<$T as NumCast>::from),
                    Value::UInt256(v) => v.to_u128().and_then(<$T as NumCast>::from),
                    _ => None,
                }
            }
        }
    };
}

impl Value {
    as_primitive!(u8);
    as_primitive!(u16);
    as_primitive!(u32);
    as_primitive!(u64);
    as_primitive!(u128);
    as_primitive!(i8);
    as_primitive!(i16);
    as_primitive!(i32);
    as_primitive!(i64);
    as_primitive!(i128);

    /// Build an array value from anything convertible into values.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Build a tuple value from anything convertible into values.
    pub fn tuple<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value as a float, converting integers and decimals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(<f64 as From<f32>>::from(*v)),
            Value::Float64(v) => Some(*v),
            Value::Decimal(v) => Some(v.to_f64()),
            Value::Int(v) => <f64 as NumCast>::from(*v),
            Value::UInt(v) => <f64 as NumCast>::from(*v),
            Value::Int128(v) => <f64 as NumCast>::from(*v),
            Value::UInt128(v) => <f64 as NumCast>::from(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The raw bytes of a string or binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The elements of an array or tuple.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// A short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Int128(_) => "int128",
            Value::UInt128(_) => "uint128",
            Value::Int256(_) => "int256",
            Value::UInt256(_) => "uint256",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Zoned(_) => "zoned datetime",
            Value::Uuid(_) => "uuid",
            Value::Ipv4(_) => "ipv4",
            Value::Ipv6(_) => "ipv6",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Json(_) => "json",
        }
    }

    /// Error for a value that a column of `type_name` can not hold.
    pub fn mismatch(&self, type_name: &str) -> ProtonError {
        proton_err!(
            Data: "{} value `{self}` is not valid for column type {type_name}",
            self.type_name()
        )
    }

    /// Require an integer that fits in `T`, reporting a data error for `type_name` otherwise.
    pub fn require<T>(
        &self,
        type_name: &str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> ProtonResult<T> {
        extract(self).ok_or_else(|| self.mismatch(type_name))
    }
}

macro_rules! value_from {
    ($variant:ident: $($T:ty),+) => {
        $(
            impl From<$T> for Value {
                fn from(value: $T) -> Self {
                    Value::$variant(value.into())
                }
            }
        )+
    };
}

value_from!(Bool: bool);
value_from!(Int: i8, i16, i32, i64);
value_from!(UInt: u8, u16, u32, u64);
value_from!(Int128: i128);
value_from!(UInt128: u128);
value_from!(Int256: i256);
value_from!(UInt256: U256);
value_from!(Float32: f32);
value_from!(Float64: f64);
value_from!(String: String, &str);
value_from!(Bytes: Bytes, Vec<u8>);
value_from!(Decimal: Decimal);
value_from!(Date: Date);
value_from!(DateTime: DateTime);
value_from!(Zoned: Zoned);
value_from!(Uuid: Uuid);
value_from!(Ipv4: Ipv4Addr);
value_from!(Ipv6: Ipv6Addr);
value_from!(Json: serde_json::Value);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_bind_value(self, None, true))
    }
}
