use std::collections::HashMap;

use bytes::BytesMut;
use itertools::Itertools;
use proton_dtype::{TypeDef, format_str};
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::wire::write_array;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::Value;

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::CodecBuilder;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

/// `enum8` and `enum16`: named values stored as `i8` or `i16`.
#[derive(Debug)]
pub(crate) struct EnumCodec {
    wide: bool,
    keys: Vec<String>,
    values: Vec<i64>,
    by_value: HashMap<i64, String>,
    by_key: HashMap<String, i64>,
}

impl EnumCodec {
    fn new(def: &TypeDef, wide: bool) -> ProtonResult<Self> {
        let type_name = if wide { "enum16" } else { "enum8" };
        let (min, max) = if wide {
            (i64::from(i16::MIN), i64::from(i16::MAX))
        } else {
            (i64::from(i8::MIN), i64::from(i8::MAX))
        };
        let values = def
            .values()
            .iter()
            .map(|arg| {
                arg.as_int()
                    .ok_or_else(|| proton_err!(Parse: "invalid {type_name} value `{arg}`"))
            })
            .collect::<ProtonResult<Vec<_>>>()?;
        if def.keys().len() != values.len() {
            proton_bail!(Parse: "mismatched keys and values in {type_name}");
        }
        if let Some(value) = values.iter().find(|v| !(min..=max).contains(*v)) {
            proton_bail!(Data: "{type_name} value {value} is out of range");
        }
        let keys = def.keys().to_vec();
        let by_value = values.iter().copied().zip(keys.iter().cloned()).collect();
        let by_key = keys.iter().cloned().zip(values.iter().copied()).collect();
        Ok(Self {
            wide,
            keys,
            values,
            by_value,
            by_key,
        })
    }

    fn type_name(&self) -> &'static str {
        if self.wide { "enum16" } else { "enum8" }
    }

    fn encode(&self, value: &Value) -> ProtonResult<i64> {
        match value {
            Value::Null => Ok(self.values.first().copied().unwrap_or(0)),
            Value::String(key) => self
                .by_key
                .get(key)
                .copied()
                .ok_or_else(|| proton_err!(Data: "unknown {} key `{key}`", self.type_name())),
            other => {
                let v = other.as_i64().ok_or_else(|| other.mismatch(self.type_name()))?;
                if !self.by_value.contains_key(&v) {
                    proton_bail!(Data: "unknown {} value {v}", self.type_name());
                }
                Ok(v)
            }
        }
    }

    fn decode(&self, value: i64, format: Format) -> Value {
        match (format, self.by_value.get(&value)) {
            (Format::Int, _) | (_, None) => Value::Int(value),
            (_, Some(key)) => Value::String(key.clone()),
        }
    }
}

impl TypeCodec for EnumCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::Int]
    }

    fn byte_size(&self) -> Option<usize> {
        Some(if self.wide { 2 } else { 1 })
    }

    fn name_suffix(&self) -> String {
        let pairs = self
            .keys
            .iter()
            .zip(&self.values)
            .map(|(key, value)| format!("{} = {value}", format_str(key)))
            .join(", ");
        format!("({pairs})")
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let raw: Vec<i64> = if self.wide {
            source.read_array::<i16>(rows)?.into_iter().map(i64::from).collect()
        } else {
            source.read_array::<i8>(rows)?.into_iter().map(i64::from).collect()
        };
        Ok(raw.into_iter().map(|v| self.decode(v, format)).collect())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let raw = column
            .iter()
            .map(|v| self.encode(v))
            .collect::<ProtonResult<Vec<_>>>()?;
        // every value is a declared one, checked against the width at build
        if self.wide {
            write_array(&raw.iter().map(|v| *v as i16).collect_vec(), dest);
        } else {
            write_array(&raw.iter().map(|v| *v as i8).collect_vec(), dest);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        self.decode(self.values.first().copied().unwrap_or(0), format)
    }
}

fn enum8(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(EnumCodec::new(def, false)?))
}

fn enum16(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(EnumCodec::new(def, true)?))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "enum8" => enum8,
        "enum16" => enum16,
    ]
}
