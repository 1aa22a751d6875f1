use std::fmt::Debug;

use bytes::BytesMut;
use proton_error::ProtonResult;
use proton_io::ByteSource;
use proton_scalar::Value;

use crate::column_type::TypeRef;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

/// State read from a column prefix that the column data needs to be decoded.
#[derive(Debug, Clone, Default)]
pub enum ReadState {
    #[default]
    Empty,
    /// One state per child column of a composite type.
    Children(Vec<ReadState>),
    /// The concrete types of a dynamic column, discovered from its prefix.
    Dynamic {
        types: Vec<TypeRef>,
        states: Vec<ReadState>,
    },
    /// The dynamic paths of a JSON column, with the states of its typed and dynamic paths.
    Json {
        typed: Vec<ReadState>,
        dynamic_paths: Vec<String>,
        dynamic: Vec<ReadState>,
    },
}

impl ReadState {
    /// The state of child `ix`, or an empty one.
    pub fn child(&self, ix: usize) -> &ReadState {
        match self {
            ReadState::Children(states) => states.get(ix).unwrap_or(&ReadState::Empty),
            _ => &ReadState::Empty,
        }
    }
}

/// Binary encoding of one type family of the native format.
///
/// A codec sees only the payload of its own type: the nullable and low cardinality overlays are
/// applied around it by [`ColumnType`][crate::ColumnType]. Values written for nullable columns may
/// contain [`Value::Null`], which codecs encode as their zero value.
pub trait TypeCodec: Debug + Send + Sync {
    /// The formats the codec can decode into or encode from; the first is the default.
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native]
    }

    /// The encoded width of a value, for fixed width types.
    fn byte_size(&self) -> Option<usize> {
        None
    }

    /// Text appended to the base name in the canonical type name, e.g. `(3, 'UTC')`.
    fn name_suffix(&self) -> String {
        String::new()
    }

    /// The type name sent when inserting, if different from the canonical name.
    fn insert_name(&self) -> Option<String> {
        None
    }

    /// Whether the type is always encoded with a null map.
    fn forces_nullable(&self) -> bool {
        false
    }

    /// Whether [`Value::Null`] can be written without a null map.
    fn accepts_null(&self) -> bool {
        false
    }

    fn read_prefix(
        &self,
        _source: &mut dyn ByteSource,
        _ctx: &QueryContext,
    ) -> ProtonResult<ReadState> {
        Ok(ReadState::Empty)
    }

    fn write_prefix(&self, _dest: &mut BytesMut, _ctx: &InsertContext) -> ProtonResult<()> {
        Ok(())
    }

    /// Decode `rows` values.
    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>>;

    /// Encode a column of values.
    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        ctx: &InsertContext,
        format: Format,
    ) -> ProtonResult<()>;

    /// The value a null decodes to when nulls are not kept.
    fn null_value(&self, _format: Format) -> Value {
        Value::Null
    }

    /// Estimated encoded size of one value, from a sample of the column.
    fn data_size(&self, _sample: &[Value]) -> usize {
        self.byte_size().unwrap_or(0)
    }
}

/// Average encoded size of the non-null values of a sample, from a per-value size.
pub(crate) fn average_size(sample: &[Value], size: impl Fn(&Value) -> usize) -> usize {
    let (total, count) = sample
        .iter()
        .filter(|v| !v.is_null())
        .fold((0, 0), |(total, count), v| (total + size(v), count + 1));
    if count == 0 { 0 } else { total / count }
}
