//! Self-describing column types. Their values are inserted as text and parsed by the server.

use bytes::{BufMut, BytesMut};
use itertools::Itertools;
use proton_dtype::{TypeDef, unescape_identifier};
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::wire::write_leb128_str;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::{Value, format_bind_value};

use crate::codec::{ReadState, TypeCodec, average_size};
use crate::codecs::{CodecBuilder, type_arg_text, value_to_json};
use crate::column_type::{TypeRef, wire_count};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;
use crate::registry::get_from_name;

const NULL_DISCRIMINATOR: u8 = 255;
/// Serialization version written ahead of inserted JSON columns.
const JSON_SERIALIZATION_VERSION: u64 = 1;

/// Decode a variant column: a discriminator per row, then the rows of each variant type in order.
fn read_variant_column(
    source: &mut dyn ByteSource,
    rows: usize,
    ctx: &QueryContext,
    types: &[TypeRef],
    states: &[ReadState],
) -> ProtonResult<Vec<Value>> {
    let discriminators = source.read_bytes(rows)?;
    let mut counts = vec![0usize; types.len()];
    for disc in discriminators.iter().filter(|d| **d != NULL_DISCRIMINATOR) {
        let count = counts.get_mut(usize::from(*disc)).ok_or_else(|| {
            proton_err!(Protocol: "variant discriminator {disc} outside {} types", types.len())
        })?;
        *count += 1;
    }
    let mut sub_columns = Vec::with_capacity(types.len());
    for (ix, (col_type, count)) in types.iter().zip(&counts).enumerate() {
        let values = if *count > 0 {
            let state = states.get(ix).unwrap_or(&ReadState::Empty);
            col_type.read_column_data(source, *count, ctx, state)?
        } else {
            Vec::new()
        };
        sub_columns.push(values.into_iter());
    }
    discriminators
        .iter()
        .map(|disc| {
            if *disc == NULL_DISCRIMINATOR {
                return Ok(Value::Null);
            }
            sub_columns
                .get_mut(usize::from(*disc))
                .and_then(Iterator::next)
                .ok_or_else(|| {
                    proton_err!(Protocol: "variant column ended early for discriminator {disc}")
                })
        })
        .collect()
}

/// The text sent for a value of a column inserted as `string`.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Json(j) => j.to_string(),
        other => format_bind_value(other, None, true),
    }
}

fn write_text_values(column: &[Value], dest: &mut BytesMut) {
    for value in column {
        write_leb128_str(&value_text(value), dest);
    }
}

/// Decode the prefix of a dynamic column, discovering its concrete types.
fn read_dynamic_prefix(source: &mut dyn ByteSource, ctx: &QueryContext) -> ProtonResult<ReadState> {
    match source.read_uint64()? {
        1 => {
            source.read_leb128()?;
        }
        2 => {}
        _ => proton_bail!(Data: "Unrecognized dynamic structure version"),
    }
    let count = wire_count(source.read_leb128()?)?;
    let mut types = (0..count)
        .map(|_| get_from_name(&source.read_leb128_str()?))
        .collect::<ProtonResult<Vec<_>>>()?;
    types.push(get_from_name("string")?);
    if source.read_uint64()? != 0 {
        proton_bail!(Data: "Unexpected discriminator format in Variant column prefix");
    }
    let states = types
        .iter()
        .map(|t| t.read_column_prefix(source, ctx))
        .collect::<ProtonResult<Vec<_>>>()?;
    Ok(ReadState::Dynamic { types, states })
}

fn read_dynamic_column(
    source: &mut dyn ByteSource,
    rows: usize,
    ctx: &QueryContext,
    state: &ReadState,
) -> ProtonResult<Vec<Value>> {
    match state {
        ReadState::Dynamic { types, states } => {
            read_variant_column(source, rows, ctx, types, states)
        }
        _ => proton_bail!(Protocol: "dynamic column data without its prefix"),
    }
}

/// `variant(T1, T2, ...)`.
#[derive(Debug)]
pub(crate) struct VariantCodec {
    elements: Vec<TypeRef>,
}

impl TypeCodec for VariantCodec {
    fn name_suffix(&self) -> String {
        format!("({})", self.elements.iter().map(|e| e.name()).join(", "))
    }

    fn insert_name(&self) -> Option<String> {
        Some("string".to_string())
    }

    fn accepts_null(&self) -> bool {
        true
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        let _mode = source.read_uint64()?;
        let states = self
            .elements
            .iter()
            .map(|e| e.read_column_prefix(source, ctx))
            .collect::<ProtonResult<Vec<_>>>()?;
        Ok(ReadState::Children(states))
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let states = match state {
            ReadState::Children(states) => states.as_slice(),
            _ => &[],
        };
        read_variant_column(source, rows, ctx, &self.elements, states)
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        write_text_values(column, dest);
        Ok(())
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        average_size(sample, |v| value_text(v).len()) + 1
    }
}

/// `dynamic[(max_types=N)]`.
#[derive(Debug)]
pub(crate) struct DynamicCodec {
    suffix: String,
}

impl TypeCodec for DynamicCodec {
    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn insert_name(&self) -> Option<String> {
        Some("string".to_string())
    }

    fn accepts_null(&self) -> bool {
        true
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        read_dynamic_prefix(source, ctx)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        read_dynamic_column(source, rows, ctx, state)
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        write_text_values(column, dest);
        Ok(())
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        average_size(sample, |v| value_text(v).len()) + 1
    }
}

/// The JSON text of a value inserted into a JSON column. Strings are taken to be JSON already.
fn json_text(value: &Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => value_to_json(other).to_string(),
    }
}

fn json_data_size(sample: &[Value]) -> usize {
    if sample.is_empty() {
        return 0;
    }
    let total: usize = sample
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| json_text(v).len())
        .sum();
    total / sample.len() + 1
}

/// Set `value` at a dotted path of nested objects.
fn insert_path(object: &mut Vec<(String, Value)>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = object;
    while let Some(part) = parts.next() {
        let ix = match current.iter().position(|(key, _)| key == part) {
            Some(ix) => ix,
            None => {
                current.push((part.to_string(), Value::Object(Vec::new())));
                current.len() - 1
            }
        };
        if parts.peek().is_none() {
            current[ix].1 = value;
            return;
        }
        if !matches!(current[ix].1, Value::Object(_)) {
            current[ix].1 = Value::Object(Vec::new());
        }
        let Value::Object(child) = &mut current[ix].1 else {
            return;
        };
        current = child;
    }
}

/// `json(...)`: typed paths with fixed types, and dynamic paths discovered per block.
#[derive(Debug)]
pub(crate) struct JsonCodec {
    typed_paths: Vec<String>,
    typed_types: Vec<TypeRef>,
    suffix: String,
}

impl JsonCodec {
    fn build(def: &TypeDef) -> ProtonResult<Self> {
        let mut codec = JsonCodec {
            typed_paths: Vec::new(),
            typed_types: Vec::new(),
            suffix: String::new(),
        };
        let mut parts = Vec::new();
        for (ix, key) in def.keys().iter().enumerate() {
            let value = type_arg_text(def, ix, "json")?;
            match (key.as_str(), value.parse::<u64>()) {
                ("max_dynamic_paths" | "max_dynamic_types", Ok(limit)) => {
                    parts.push(format!("{key} = {limit}"));
                }
                ("SKIP", _) => {
                    let skip = match value.strip_prefix("REGEXP") {
                        Some(pattern) => format!("REGEXP {}", pattern.trim_start()),
                        None if value.starts_with('`') => value.to_string(),
                        None => format!("`{value}`"),
                    };
                    parts.push(format!("SKIP {skip}"));
                }
                (path, _) => {
                    let path = unescape_identifier(path);
                    codec.typed_types.push(get_from_name(value)?);
                    parts.push(format!("`{path}` {value}"));
                    codec.typed_paths.push(path);
                }
            }
        }
        if !parts.is_empty() {
            codec.suffix = format!("({})", parts.join(", "));
        }
        Ok(codec)
    }
}

impl TypeCodec for JsonCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::String]
    }

    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        match source.read_uint64()? {
            0 => {
                source.read_leb128()?;
            }
            2 => {}
            version => proton_bail!(
                Data: "Unrecognized json structure version: {version} column: `{}`",
                ctx.active_column().unwrap_or_default()
            ),
        }
        let path_count = wire_count(source.read_leb128()?)?;
        let dynamic_paths = (0..path_count)
            .map(|_| source.read_leb128_str())
            .collect::<ProtonResult<Vec<_>>>()?;
        let typed = self
            .typed_types
            .iter()
            .map(|t| t.read_column_prefix(source, ctx))
            .collect::<ProtonResult<Vec<_>>>()?;
        let dynamic = (0..path_count)
            .map(|_| read_dynamic_prefix(source, ctx))
            .collect::<ProtonResult<Vec<_>>>()?;
        Ok(ReadState::Json {
            typed,
            dynamic_paths,
            dynamic,
        })
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let ReadState::Json {
            typed,
            dynamic_paths,
            dynamic,
        } = state
        else {
            proton_bail!(Protocol: "json column data without its prefix");
        };
        let typed_columns = self
            .typed_types
            .iter()
            .zip(typed)
            .map(|(t, state)| t.read_column_data(source, rows, ctx, state))
            .collect::<ProtonResult<Vec<_>>>()?;
        let dynamic_columns = dynamic
            .iter()
            .map(|state| read_dynamic_column(source, rows, ctx, state))
            .collect::<ProtonResult<Vec<_>>>()?;

        let mut typed_iters = typed_columns.into_iter().map(Vec::into_iter).collect_vec();
        let mut dynamic_iters = dynamic_columns.into_iter().map(Vec::into_iter).collect_vec();
        let mut values = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut top = Vec::new();
            for (path, column) in self.typed_paths.iter().zip(typed_iters.iter_mut()) {
                insert_path(&mut top, path, column.next().unwrap_or(Value::Null));
            }
            for (path, column) in dynamic_paths.iter().zip(dynamic_iters.iter_mut()) {
                match column.next() {
                    None | Some(Value::Null) => {}
                    Some(value) => insert_path(&mut top, path, value),
                }
            }
            let row = Value::Object(top);
            values.push(match format {
                Format::String => Value::String(value_to_json(&row).to_string()),
                _ => row,
            });
        }
        Ok(values)
    }

    fn write_prefix(&self, dest: &mut BytesMut, _ctx: &InsertContext) -> ProtonResult<()> {
        dest.put_u64_le(JSON_SERIALIZATION_VERSION);
        Ok(())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        for value in column {
            write_leb128_str(&json_text(value), dest);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String("{}".to_string()),
            _ => Value::Object(Vec::new()),
        }
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        json_data_size(sample)
    }
}

/// The legacy `object('json')` type, transferred as JSON text.
#[derive(Debug)]
pub(crate) struct ObjectCodec {
    suffix: String,
}

impl TypeCodec for ObjectCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::String]
    }

    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let texts = source.read_str_col(rows)?;
        if format == Format::String {
            return Ok(texts.into_iter().map(Value::String).collect());
        }
        texts
            .iter()
            .map(|text| Ok(Value::Json(serde_json::from_str(text)?)))
            .collect()
    }

    fn write_prefix(&self, dest: &mut BytesMut, _ctx: &InsertContext) -> ProtonResult<()> {
        dest.put_u8(0x01);
        Ok(())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        for value in column {
            write_leb128_str(&json_text(value), dest);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String("{}".to_string()),
            _ => Value::Json(serde_json::Value::Object(serde_json::Map::new())),
        }
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        json_data_size(sample)
    }
}

fn variant(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let elements = (0..def.values().len())
        .map(|ix| get_from_name(type_arg_text(def, ix, "variant")?))
        .collect::<ProtonResult<Vec<_>>>()?;
    Ok(Box::new(VariantCodec { elements }))
}

fn dynamic(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let suffix = match (def.keys().first(), def.values().first()) {
        (Some(key), Some(value)) if key == "max_types" => format!("(max_types={value})"),
        _ => String::new(),
    };
    Ok(Box::new(DynamicCodec { suffix }))
}

fn json(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(JsonCodec::build(def)?))
}

fn object(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let kind = def
        .values()
        .first()
        .map(|arg| arg.to_string().to_lowercase().replace(' ', ""))
        .unwrap_or_default();
    if kind != "'json'" && kind != "nullable('json')" {
        proton_bail!(NotImplemented: "object types other than object('json')", "proton");
    }
    Ok(Box::new(ObjectCodec {
        suffix: def.arg_str(),
    }))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "variant" => variant,
        "dynamic" => dynamic,
        "json" => json,
        "object" => object,
    ]
}
