//! The codec of every supported type family, and the table the registry builds them from.

use itertools::Itertools;
use proton_dtype::{TypeArg, TypeDef};
use proton_error::{ProtonResult, proton_err};
use proton_scalar::{Value, format_timestamp, i256_to_string};
use serde_json::{Map, Number};

use crate::codec::TypeCodec;

/// A list of `base => builder` entries.
macro_rules! codec_table {
    ($($base:literal => $build:expr),* $(,)?) => {
        vec![$(($base, $build as $crate::codecs::CodecBuilder)),*]
    };
}

mod bigint;
mod container;
mod decimal;
mod dynamic;
mod enums;
mod network;
mod numeric;
mod special;
mod string;
mod temporal;

/// Builds the codec of one base type from its parsed definition.
pub(crate) type CodecBuilder = fn(&TypeDef) -> ProtonResult<Box<dyn TypeCodec>>;

/// Every supported base type, by normalized name.
pub(crate) fn codec_builders() -> Vec<(&'static str, CodecBuilder)> {
    let mut builders = Vec::new();
    builders.extend(numeric::builders());
    builders.extend(bigint::builders());
    builders.extend(string::builders());
    builders.extend(temporal::builders());
    builders.extend(decimal::builders());
    builders.extend(network::builders());
    builders.extend(enums::builders());
    builders.extend(container::builders());
    builders.extend(dynamic::builders());
    builders.extend(special::builders());
    builders
}

/// Bytes as space separated hex, for error messages.
pub(crate) fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).join(" ")
}

/// The argument at `ix` of a type definition.
pub(crate) fn type_arg<'a>(
    def: &'a TypeDef,
    ix: usize,
    type_name: &str,
) -> ProtonResult<&'a TypeArg> {
    def.values()
        .get(ix)
        .ok_or_else(|| proton_err!(Parse: "{type_name} is missing argument {}", ix + 1))
}

/// The text of the argument at `ix`, such as a nested type name.
pub(crate) fn type_arg_text<'a>(
    def: &'a TypeDef,
    ix: usize,
    type_name: &str,
) -> ProtonResult<&'a str> {
    let arg = type_arg(def, ix, type_name)?;
    arg.as_text()
        .ok_or_else(|| proton_err!(Parse: "argument `{arg}` of {type_name} is not a type"))
}

/// A value as JSON, rendering values without a JSON counterpart as strings.
pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Int(v) => Json::from(*v),
        Value::UInt(v) => Json::from(*v),
        Value::Int128(v) => {
            i64::try_from(*v).map_or_else(|_| Json::String(v.to_string()), Json::from)
        }
        Value::UInt128(v) => {
            u64::try_from(*v).map_or_else(|_| Json::String(v.to_string()), Json::from)
        }
        Value::Int256(v) => Json::String(i256_to_string(*v)),
        Value::UInt256(v) => Json::String(v.to_string()),
        Value::Float32(v) => Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
        Value::Float64(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Date(d) => Json::String(d.to_string()),
        Value::DateTime(_) | Value::Zoned(_) => {
            format_timestamp(value, None).map_or(Json::Null, Json::String)
        }
        Value::Uuid(u) => Json::String(u.to_string()),
        Value::Ipv4(ip) => Json::String(ip.to_string()),
        Value::Ipv6(ip) => Json::String(ip.to_string()),
        Value::Array(items) | Value::Tuple(items) => {
            Json::Array(items.iter().map(value_to_json).collect())
        }
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (json_key(k), value_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Object(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Json(j) => j.clone(),
    }
}

fn json_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => match value_to_json(other) {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

#[cfg(test)]
mod tests;
