//! Column types of the Proton native block format.
//!
//! A type name read from a block header resolves through the [registry][get_from_name] to a shared
//! [`ColumnType`]: the [`TypeCodec`] of its base type wrapped in the nullable and low cardinality
//! overlays. Decoding is driven by a [`QueryContext`], which also decides the [`Format`] values are
//! produced in; encoding by an [`InsertContext`], which splits insert data into [`Block`]s.

pub use block::*;
pub use codec::*;
pub use column_type::*;
pub use context::*;
pub use format::*;
pub use registry::*;

mod block;
mod codec;
mod codecs;
mod column_type;
mod context;
mod format;
mod registry;
