//! Rendering of values as SQL literals.
//!
//! [`format_query_value`] renders a value for substitution directly into query text, while
//! [`format_bind_value`] renders the text of a server side query parameter, where a top level
//! string is sent without quotes and a top level null is `\N`.

use itertools::Itertools;
use jiff::tz::TimeZone;
use proton_dtype::{escape_str, format_str};

use crate::Value;
use crate::bigint::i256_to_string;
use crate::datetime::format_timestamp;

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        value.to_string()
    }
}

/// Render the parts of a value that are the same in both literal flavors, or `None` for the
/// values whose rendering depends on the flavor.
fn format_scalar(value: &Value) -> Option<String> {
    Some(match value {
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Int128(v) => v.to_string(),
        Value::UInt128(v) => v.to_string(),
        Value::Int256(v) => i256_to_string(*v),
        Value::UInt256(v) => v.to_string(),
        Value::Float32(v) => format_float(f64::from(*v)),
        Value::Float64(v) => format_float(*v),
        Value::Decimal(v) => v.to_string(),
        _ => return None,
    })
}

/// The unquoted text of a value that is rendered as a quoted string.
fn string_text(value: &Value, server_tz: Option<&TimeZone>) -> Option<String> {
    Some(match value {
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Date(d) => d.to_string(),
        Value::DateTime(_) | Value::Zoned(_) => format_timestamp(value, server_tz)?,
        Value::Uuid(u) => u.to_string(),
        Value::Ipv4(ip) => ip.to_string(),
        Value::Ipv6(ip) => ip.to_string(),
        Value::Json(j) => j.to_string(),
        _ => return None,
    })
}

/// Render a value as a SQL literal for client side substitution into a query.
pub fn format_query_value(value: &Value, server_tz: Option<&TimeZone>) -> String {
    if let Some(text) = format_scalar(value) {
        return text;
    }
    if let Some(text) = string_text(value, server_tz) {
        return format_str(&text);
    }
    let nested = |v: &Value| format_query_value(v, server_tz);
    match value {
        Value::Array(items) => format!("[{}]", items.iter().map(nested).join(", ")),
        Value::Tuple(items) => format!("({})", items.iter().map(nested).join(", ")),
        Value::Map(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{}: {}", nested(k), nested(v)))
                .join(", ")
        ),
        Value::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(k, v)| format!("{}: {}", format_str(k), nested(v)))
                .join(", ")
        ),
        _ => "NULL".to_string(),
    }
}

/// Render a value as the text of a server side query parameter.
pub fn format_bind_value(value: &Value, server_tz: Option<&TimeZone>, top_level: bool) -> String {
    if let Some(text) = format_scalar(value) {
        return text;
    }
    if let Some(text) = string_text(value, server_tz) {
        return if top_level {
            escape_str(&text)
        } else {
            format_str(&text)
        };
    }
    let nested = |v: &Value| format_bind_value(v, server_tz, false);
    match value {
        Value::Null if top_level => "\\N".to_string(),
        Value::Array(items) => format!("[{}]", items.iter().map(nested).join(", ")),
        Value::Tuple(items) => format!("({})", items.iter().map(nested).join(", ")),
        Value::Map(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{}: {}", nested(k), nested(v)))
                .join(", ")
        ),
        Value::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(k, v)| format!("{}: {}", format_str(k), nested(v)))
                .join(", ")
        ),
        _ => "NULL".to_string(),
    }
}
