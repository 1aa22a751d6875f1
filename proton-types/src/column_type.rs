use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use itertools::Itertools;
use jiff::tz::TimeZone;
use log::warn;
use proton_dtype::TypeDef;
use proton_error::{ContextExt, ProtonResult, proton_bail, proton_err};
use proton_io::wire::write_array;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::{Value, format_bind_value};

use crate::codec::{ReadState, TypeCodec};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

/// A shared, immutable column type.
pub type TypeRef = Arc<ColumnType>;

const LOW_CARD_VERSION: u64 = 1;
/// Low cardinality key flags: the dictionary is shared and carries additional keys.
const LOW_CARD_KEY_FLAGS: u64 = (1 << 9) | (1 << 10);

/// A resolved column type: a codec together with its nullable and low cardinality overlays.
///
/// Column types are built once per distinct type name by the
/// [registry][crate::registry::get_from_name] and shared between every column of that type.
#[derive(Debug)]
pub struct ColumnType {
    name: String,
    base: String,
    type_def: TypeDef,
    nullable: bool,
    low_card: bool,
    codec: Box<dyn TypeCodec>,
}

impl ColumnType {
    pub(crate) fn new(base: &str, type_def: TypeDef, codec: Box<dyn TypeCodec>) -> Self {
        let nullable = type_def.is_nullable() || codec.forces_nullable();
        let low_card = type_def.is_low_cardinality();
        let name = type_def.wrap_name(&format!("{base}{}", codec.name_suffix()));
        Self {
            name,
            base: proton_dtype::normalize_base(base),
            type_def,
            nullable,
            low_card,
            codec,
        }
    }

    /// The canonical type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized base name, e.g. `fixedstring`, matched by format patterns.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.type_def
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn low_card(&self) -> bool {
        self.low_card
    }

    pub fn byte_size(&self) -> Option<usize> {
        self.codec.byte_size()
    }

    pub fn codec(&self) -> &dyn TypeCodec {
        self.codec.as_ref()
    }

    pub fn valid_formats(&self) -> &'static [Format] {
        self.codec.valid_formats()
    }

    /// The type name sent in the header of an inserted column.
    pub fn insert_name(&self) -> String {
        match self.codec.insert_name() {
            Some(name) => self.type_def.wrap_name(&name),
            None => self.name.clone(),
        }
    }

    /// Decode a column: its prefix followed by `rows` values.
    pub fn read_column(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
    ) -> ProtonResult<Vec<Value>> {
        let state = self.read_column_prefix(source, ctx)?;
        self.read_column_data(source, rows, ctx, &state)
    }

    pub fn read_column_prefix(
        &self,
        source: &mut dyn ByteSource,
        ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        if self.low_card {
            let version = source.read_uint64()?;
            if version != LOW_CARD_VERSION {
                warn!("unexpected low cardinality version {version} reading type {}", self.name);
            }
        }
        self.codec.read_prefix(source, ctx)
    }

    pub fn read_column_data(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
    ) -> ProtonResult<Vec<Value>> {
        let format = ctx.read_format(&self.base, self.codec.valid_formats());
        if self.low_card {
            return self.read_low_card(source, rows, ctx, state, format);
        }
        if !self.nullable {
            return self.codec.read_binary(source, rows, ctx, state, format);
        }
        let null_map = source.read_bytes(rows)?;
        let mut values = self.codec.read_binary(source, rows, ctx, state, format)?;
        if null_map.iter().any(|is_null| *is_null != 0) {
            let null = self.null_for(ctx, format);
            for (value, is_null) in values.iter_mut().zip(null_map.iter()) {
                if *is_null != 0 {
                    *value = null.clone();
                }
            }
        }
        Ok(values)
    }

    fn read_low_card(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        if rows == 0 {
            return Ok(Vec::new());
        }
        let key_data = source.read_uint64()?;
        let index_size = wire_count(source.read_uint64()?)?;
        let index = self.codec.read_binary(source, index_size, ctx, state, format)?;
        let key_count = wire_count(source.read_uint64()?)?;
        let keys: Vec<u64> = match key_data & 0xff {
            0 => source.read_array::<u8>(key_count)?.into_iter().map(u64::from).collect(),
            1 => source.read_array::<u16>(key_count)?.into_iter().map(u64::from).collect(),
            2 => source.read_array::<u32>(key_count)?.into_iter().map(u64::from).collect(),
            3 => source.read_array::<u64>(key_count)?,
            other => proton_bail!(
                Protocol: "invalid low cardinality key type {other} in column type {}",
                self.name
            ),
        };
        let null = self.nullable.then(|| self.null_for(ctx, format));
        keys.into_iter()
            .map(|key| match (&null, key) {
                (Some(null), 0) => Ok(null.clone()),
                _ => usize::try_from(key)
                    .ok()
                    .and_then(|key| index.get(key))
                    .cloned()
                    .ok_or_else(|| {
                        proton_err!(
                            Protocol: "low cardinality key {key} outside dictionary of {} values",
                            index.len()
                        )
                    }),
            })
            .collect()
    }

    fn null_for(&self, ctx: &QueryContext, format: Format) -> Value {
        if ctx.use_none() {
            Value::Null
        } else {
            self.codec.null_value(format)
        }
    }

    /// The value a null of this type decodes to in `ctx`.
    pub fn null_value(&self, ctx: &QueryContext) -> Value {
        self.null_for(ctx, ctx.read_format(&self.base, self.codec.valid_formats()))
    }

    /// Encode a column: its prefix followed by its values.
    pub fn write_column(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
    ) -> ProtonResult<()> {
        self.write_column_prefix(dest, ctx)?;
        self.write_column_data(column, dest, ctx)
    }

    pub fn write_column_prefix(
        &self,
        dest: &mut BytesMut,
        ctx: &InsertContext,
    ) -> ProtonResult<()> {
        if self.low_card {
            dest.put_u64_le(LOW_CARD_VERSION);
        }
        self.codec.write_prefix(dest, ctx)
    }

    pub fn write_column_data(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
    ) -> ProtonResult<()> {
        let format = ctx.write_format(&self.base, self.codec.valid_formats());
        if !self.nullable && !self.codec.accepts_null() && column.iter().any(Value::is_null) {
            proton_bail!(Data: "Invalid null value in non-nullable column type {}", self.name);
        }
        if self.low_card {
            return self.write_low_card(column, dest, ctx, format);
        }
        if self.nullable {
            dest.reserve(column.len());
            for value in column {
                dest.put_u8(u8::from(value.is_null()));
            }
        }
        self.codec.write_binary(column, dest, ctx, format)
    }

    fn write_low_card(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        format: Format,
    ) -> ProtonResult<()> {
        if column.is_empty() {
            return Ok(());
        }
        // dictionary entries keyed by their encoding, in first-seen order
        let mut index = BytesMut::new();
        let mut index_len = 0u64;
        let mut seen: HashMap<BytesMut, u64> = HashMap::new();
        let mut keys = Vec::with_capacity(column.len());
        if self.nullable {
            self.codec.write_binary(&[Value::Null], &mut index, ctx, format)?;
            index_len = 1;
        }
        for value in column {
            if value.is_null() {
                keys.push(0);
                continue;
            }
            let mut encoded = BytesMut::new();
            self.codec
                .write_binary(std::slice::from_ref(value), &mut encoded, ctx, format)?;
            let key = match seen.get(&encoded) {
                Some(key) => *key,
                None => {
                    index.extend_from_slice(&encoded);
                    seen.insert(encoded, index_len);
                    index_len += 1;
                    index_len - 1
                }
            };
            keys.push(key);
        }
        let ix_type = index_len.max(1).ilog2() >> 3;
        dest.put_u64_le(LOW_CARD_KEY_FLAGS | u64::from(ix_type));
        dest.put_u64_le(index_len);
        dest.extend_from_slice(&index);
        dest.put_u64_le(keys.len() as u64);
        write_keys(&keys, ix_type, dest)
    }

    /// Estimated encoded size of one value, from a sample of the column.
    pub fn data_size(&self, sample: &[Value]) -> usize {
        let size = if self.low_card {
            let mut distinct: Vec<&Value> = Vec::new();
            for value in sample {
                if !distinct.contains(&value) {
                    distinct.push(value);
                }
            }
            distinct.len() + 2
        } else {
            self.codec.data_size(sample)
        };
        size + usize::from(self.nullable)
    }

    /// Render a value as the text of a server side query parameter of this type, failing if the
    /// value can not be encoded as one.
    pub fn bind_literal(
        &self,
        value: &Value,
        server_tz: Option<&TimeZone>,
    ) -> ProtonResult<String> {
        if value.is_null() {
            if self.nullable || self.codec.accepts_null() {
                return Ok("\\N".to_string());
            }
            proton_bail!(Data: "null parameter is not valid for non-nullable type {}", self.name);
        }
        let mut scratch = BytesMut::new();
        self.codec
            .write_binary(
                std::slice::from_ref(value),
                &mut scratch,
                &InsertContext::detached(),
                Format::Native,
            )
            .with_context(|| format!("invalid parameter for type {}", self.name))?;
        Ok(format_bind_value(value, server_tz, true))
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_keys(keys: &[u64], ix_type: u32, dest: &mut BytesMut) -> ProtonResult<()> {
    match ix_type {
        0 => write_array(&keys.iter().map(|k| *k as u8).collect_vec(), dest),
        1 => write_array(&keys.iter().map(|k| *k as u16).collect_vec(), dest),
        2 => write_array(&keys.iter().map(|k| *k as u32).collect_vec(), dest),
        3 => write_array(keys, dest),
        other => proton_bail!(Data: "low cardinality dictionary too large for key type {other}"),
    }
    Ok(())
}

/// A count read from the wire as a `usize`.
pub(crate) fn wire_count(count: u64) -> ProtonResult<usize> {
    usize::try_from(count)
        .map_err(|_| proton_err!(Protocol: "count {count} does not fit in memory"))
}
