use bytes::{BufMut, BytesMut};
use itertools::Itertools;
use proton_dtype::{TypeDef, quote_identifier};
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::Value;

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::{CodecBuilder, type_arg_text, value_to_json};
use crate::column_type::{TypeRef, wire_count};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;
use crate::registry::get_from_name;

/// Read `rows` cumulative offsets and check they never decrease.
fn read_offsets(source: &mut dyn ByteSource, rows: usize) -> ProtonResult<Vec<usize>> {
    let offsets = source
        .read_array::<u64>(rows)?
        .into_iter()
        .map(wire_count)
        .collect::<ProtonResult<Vec<_>>>()?;
    if offsets.iter().tuple_windows().any(|(a, b)| b < a) {
        proton_bail!(Protocol: "decreasing offsets in array column");
    }
    Ok(offsets)
}

fn write_offsets(lengths: impl IntoIterator<Item = usize>, dest: &mut BytesMut) {
    let mut offset = 0u64;
    for len in lengths {
        offset += len as u64;
        dest.put_u64_le(offset);
    }
}

/// Split decoded items into consecutive runs ending at `offsets`.
fn split_at_offsets(items: Vec<Value>, offsets: &[usize]) -> Vec<Vec<Value>> {
    let mut items = items.into_iter();
    let mut start = 0;
    offsets
        .iter()
        .map(|end| {
            let run = items.by_ref().take(end.saturating_sub(start)).collect();
            start = *end;
            run
        })
        .collect()
}

/// Turn columns of equal length into rows, moving the values.
fn columns_to_rows(columns: Vec<Vec<Value>>, rows: usize) -> Vec<Vec<Value>> {
    let mut out: Vec<Vec<Value>> = (0..rows).map(|_| Vec::with_capacity(columns.len())).collect();
    for column in columns {
        for (row, value) in out.iter_mut().zip(column) {
            row.push(value);
        }
    }
    out
}

/// The insert name of a composite type when one of its children inserts under another name.
fn composite_insert_name(
    base: &str,
    children: &[&TypeRef],
    render: impl Fn(Vec<String>) -> String,
) -> Option<String> {
    children
        .iter()
        .any(|child| child.insert_name() != child.name())
        .then(|| {
            let names = children.iter().map(|c| c.insert_name()).collect();
            format!("{base}{}", render(names))
        })
}

/// `array(T)`: offsets followed by the flattened elements.
#[derive(Debug)]
pub(crate) struct ArrayCodec {
    element: TypeRef,
}

impl TypeCodec for ArrayCodec {
    fn name_suffix(&self) -> String {
        format!("({})", self.element.name())
    }

    fn insert_name(&self) -> Option<String> {
        composite_insert_name("array", &[&self.element], |names| format!("({})", names.join(", ")))
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        Ok(ReadState::Children(vec![self.element.read_column_prefix(source, ctx)?]))
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
        let offsets = read_offsets(source, rows)?;
        let total = offsets.last().copied().unwrap_or(0);
        let items = self.element.read_column_data(source, total, ctx, state.child(0))?;
        Ok(split_at_offsets(items, &offsets)
            .into_iter()
            .map(Value::Array)
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let lists = column
            .iter()
            .map(|v| match v {
                Value::Null => Ok(&[][..]),
                v => v.as_list().ok_or_else(|| v.mismatch("array")),
            })
            .collect::<ProtonResult<Vec<_>>>()?;
        write_offsets(lists.iter().map(|l| l.len()), dest);
        let items = lists.into_iter().flatten().cloned().collect_vec();
        self.element.write_column_data(&items, dest, ctx)
    }

    fn null_value(&self, _format: Format) -> Value {
        Value::Array(Vec::new())
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        if sample.is_empty() {
            return 8;
        }
        let total: usize = sample
            .iter()
            .filter_map(Value::as_list)
            .map(|items| self.element.data_size(items))
            .sum();
        total / sample.len() + 8
    }
}

/// `tuple(T1, T2, ...)` or `tuple(name1 T1, ...)`: one column per element.
#[derive(Debug)]
pub(crate) struct TupleCodec {
    names: Vec<String>,
    elements: Vec<TypeRef>,
}

impl TupleCodec {
    fn build(def: &TypeDef) -> ProtonResult<Self> {
        let elements = (0..def.values().len())
            .map(|ix| get_from_name(type_arg_text(def, ix, "tuple")?))
            .collect::<ProtonResult<Vec<_>>>()?;
        Ok(Self {
            names: def.keys().to_vec(),
            elements,
        })
    }

    fn render(&self, names: Vec<String>, quote: bool) -> String {
        let parts = if self.names.is_empty() {
            names
        } else {
            self.names
                .iter()
                .zip(names)
                .map(|(key, name)| {
                    let key = if quote { quote_identifier(key) } else { key.clone() };
                    format!("{key} {name}")
                })
                .collect()
        };
        format!("({})", parts.join(", "))
    }

    fn field_name(&self, ix: usize) -> String {
        self.names.get(ix).cloned().unwrap_or_else(|| ix.to_string())
    }

    /// The element values of one row.
    fn row_items(&self, value: &Value) -> ProtonResult<Vec<Value>> {
        Ok(match value {
            Value::Null => vec![Value::Null; self.elements.len()],
            Value::Object(fields) => (0..self.elements.len())
                .map(|ix| {
                    let name = self.field_name(ix);
                    fields
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map_or(Value::Null, |(_, v)| v.clone())
                })
                .collect(),
            other => {
                let items = other.as_list().ok_or_else(|| other.mismatch("tuple"))?;
                if items.len() != self.elements.len() {
                    proton_bail!(
                        Data: "tuple value with {} elements written to a tuple of {}",
                        items.len(),
                        self.elements.len()
                    );
                }
                items.to_vec()
            }
        })
    }

    fn decode(&self, items: Vec<Value>, format: Format) -> Value {
        match format {
            Format::Dict => Value::Object(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(ix, v)| (self.field_name(ix), v))
                    .collect(),
            ),
            Format::Json => {
                let value = if self.names.is_empty() {
                    Value::Tuple(items)
                } else {
                    self.decode(items, Format::Dict)
                };
                Value::String(value_to_json(&value).to_string())
            }
            _ => Value::Tuple(items),
        }
    }
}

impl TypeCodec for TupleCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::Dict, Format::Json]
    }

    fn name_suffix(&self) -> String {
        self.render(self.elements.iter().map(|e| e.name().to_string()).collect(), true)
    }

    fn insert_name(&self) -> Option<String> {
        let children = self.elements.iter().collect_vec();
        composite_insert_name("tuple", &children, |names| self.render(names, true))
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        let states = self
            .elements
            .iter()
            .map(|e| e.read_column_prefix(source, ctx))
            .collect::<ProtonResult<Vec<_>>>()?;
        Ok(ReadState::Children(states))
    }

    fn write_prefix(&self, dest: &mut BytesMut, ctx: &InsertContext) -> ProtonResult<()> {
        self.elements.iter().try_for_each(|e| e.write_column_prefix(dest, ctx))
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let columns = self
            .elements
            .iter()
            .enumerate()
            .map(|(ix, e)| e.read_column_data(source, rows, ctx, state.child(ix)))
            .collect::<ProtonResult<Vec<_>>>()?;
        Ok(columns_to_rows(columns, rows)
            .into_iter()
            .map(|items| self.decode(items, format))
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let rows = column
            .iter()
            .map(|v| self.row_items(v))
            .collect::<ProtonResult<Vec<_>>>()?;
        for (ix, element) in self.elements.iter().enumerate() {
            let values = rows.iter().map(|row| row[ix].clone()).collect_vec();
            element.write_column_data(&values, dest, ctx)?;
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        self.decode(vec![Value::Null; self.elements.len()], format)
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        let rows = sample.iter().filter_map(|v| self.row_items(v).ok()).collect_vec();
        self.elements
            .iter()
            .enumerate()
            .map(|(ix, element)| {
                let values = rows.iter().map(|row| row[ix].clone()).collect_vec();
                element.data_size(&values)
            })
            .sum()
    }
}

/// `map(K, V)`: offsets followed by a key column and a value column.
#[derive(Debug)]
pub(crate) struct MapCodec {
    key: TypeRef,
    value: TypeRef,
}

impl MapCodec {
    fn entries(value: &Value) -> ProtonResult<Vec<(Value, Value)>> {
        Ok(match value {
            Value::Null => Vec::new(),
            Value::Map(entries) => entries.clone(),
            Value::Object(fields) => fields
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
            other => return Err(other.mismatch("map")),
        })
    }
}

impl TypeCodec for MapCodec {
    fn name_suffix(&self) -> String {
        format!("({}, {})", self.key.name(), self.value.name())
    }

    fn insert_name(&self) -> Option<String> {
        composite_insert_name("map", &[&self.key, &self.value], |names| {
            format!("({})", names.join(", "))
        })
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        let key = self.key.read_column_prefix(source, ctx)?;
        let value = self.value.read_column_prefix(source, ctx)?;
        Ok(ReadState::Children(vec![key, value]))
    }

    fn write_prefix(&self, dest: &mut BytesMut, ctx: &InsertContext) -> ProtonResult<()> {
        self.key.write_column_prefix(dest, ctx)?;
        self.value.write_column_prefix(dest, ctx)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let offsets = read_offsets(source, rows)?;
        let total = offsets.last().copied().unwrap_or(0);
        let keys = self.key.read_column_data(source, total, ctx, state.child(0))?;
        let values = self.value.read_column_data(source, total, ctx, state.child(1))?;
        let pairs = keys.into_iter().zip(values).collect_vec();
        let mut pairs = pairs.into_iter();
        let mut start = 0;
        Ok(offsets
            .iter()
            .map(|end| {
                let entries = pairs.by_ref().take(end.saturating_sub(start)).collect();
                start = *end;
                Value::Map(entries)
            })
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let rows = column
            .iter()
            .map(Self::entries)
            .collect::<ProtonResult<Vec<_>>>()?;
        write_offsets(rows.iter().map(Vec::len), dest);
        let (keys, values): (Vec<Value>, Vec<Value>) = rows.into_iter().flatten().unzip();
        self.key.write_column_data(&keys, dest, ctx)?;
        self.value.write_column_data(&values, dest, ctx)
    }

    fn null_value(&self, _format: Format) -> Value {
        Value::Map(Vec::new())
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        if sample.is_empty() {
            return 8;
        }
        let total: usize = sample
            .iter()
            .filter_map(|v| Self::entries(v).ok())
            .map(|entries| {
                let (keys, values): (Vec<Value>, Vec<Value>) = entries.into_iter().unzip();
                self.key.data_size(&keys) + self.value.data_size(&values)
            })
            .sum();
        total / sample.len() + 8
    }
}

/// `nested(name1 T1, ...)`: stored as `array(tuple(...))`, decoded as arrays of objects.
#[derive(Debug)]
pub(crate) struct NestedCodec {
    names: Vec<String>,
    types: Vec<String>,
    inner: TypeRef,
}

impl NestedCodec {
    fn to_objects(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Tuple(fields) => {
                            Value::Object(self.names.iter().cloned().zip(fields).collect())
                        }
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

impl TypeCodec for NestedCodec {
    fn name_suffix(&self) -> String {
        let parts = self
            .names
            .iter()
            .zip(&self.types)
            .map(|(name, type_name)| format!("{name} {type_name}"))
            .join(", ");
        format!("({parts})")
    }

    fn read_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        self.inner.read_column_prefix(source, ctx)
    }

    fn write_prefix(&self, dest: &mut BytesMut, ctx: &InsertContext) -> ProtonResult<()> {
        self.inner.write_column_prefix(dest, ctx)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        _format: Format,
    ) -> ProtonResult<Vec<Value>> {
        Ok(self
            .inner
            .read_column_data(source, rows, ctx, state)?
            .into_iter()
            .map(|v| self.to_objects(v))
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        self.inner.write_column_data(column, dest, ctx)
    }

    fn null_value(&self, _format: Format) -> Value {
        Value::Array(Vec::new())
    }

    fn data_size(&self, sample: &[Value]) -> usize {
        self.inner.data_size(sample)
    }
}

fn array(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let element = get_from_name(type_arg_text(def, 0, "array")?)?;
    Ok(Box::new(ArrayCodec { element }))
}

fn tuple(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(TupleCodec::build(def)?))
}

fn map(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let key = get_from_name(type_arg_text(def, 0, "map")?)?;
    let value = get_from_name(type_arg_text(def, 1, "map")?)?;
    Ok(Box::new(MapCodec { key, value }))
}

fn nested(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    if def.keys().is_empty() || def.keys().len() != def.values().len() {
        proton_bail!(Parse: "nested requires named elements");
    }
    let types = (0..def.values().len())
        .map(|ix| type_arg_text(def, ix, "nested").map(str::to_string))
        .collect::<ProtonResult<Vec<_>>>()?;
    let fields = def
        .keys()
        .iter()
        .zip(&types)
        .map(|(name, type_name)| format!("{} {type_name}", quote_identifier(name)))
        .join(", ");
    let inner = get_from_name(&format!("array(tuple({fields}))"))
        .map_err(|err| proton_err!(Parse: "invalid nested elements: {err}"))?;
    Ok(Box::new(NestedCodec {
        names: def.keys().to_vec(),
        types,
        inner,
    }))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "array" => array,
        "tuple" => tuple,
        "map" => map,
        "nested" => nested,
    ]
}
