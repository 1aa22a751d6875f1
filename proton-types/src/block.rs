use bytes::Bytes;
use proton_error::{ProtonResult, proton_bail};
use proton_scalar::Value;

use crate::column_type::TypeRef;

/// One unit of the native format: named, typed columns sharing a row count.
#[derive(Debug, Clone)]
pub struct Block {
    prefix: Option<Bytes>,
    column_names: Vec<String>,
    column_types: Vec<TypeRef>,
    columns: Vec<Vec<Value>>,
    row_count: usize,
}

impl Block {
    pub fn new(
        column_names: Vec<String>,
        column_types: Vec<TypeRef>,
        columns: Vec<Vec<Value>>,
    ) -> ProtonResult<Self> {
        if column_names.len() != column_types.len() || column_names.len() != columns.len() {
            proton_bail!(
                Data: "block has {} column names, {} types and {} columns",
                column_names.len(),
                column_types.len(),
                columns.len()
            );
        }
        let row_count = columns.first().map_or(0, Vec::len);
        if let Some((ix, column)) = columns.iter().enumerate().find(|(_, c)| c.len() != row_count) {
            proton_bail!(
                Data: "column `{}` has {} rows, expected {row_count}",
                column_names[ix],
                column.len()
            );
        }
        Ok(Self {
            prefix: None,
            column_names,
            column_types,
            columns,
            row_count,
        })
    }

    /// Attach bytes sent ahead of the block, such as the `INSERT` statement.
    pub fn with_prefix(mut self, prefix: Bytes) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn prefix(&self) -> Option<&Bytes> {
        self.prefix.as_ref()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[TypeRef] {
        &self.column_types
    }

    pub fn columns(&self) -> &[Vec<Value>] {
        &self.columns
    }

    pub fn column(&self, ix: usize) -> Option<&[Value]> {
        self.columns.get(ix).map(Vec::as_slice)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn into_columns(self) -> Vec<Vec<Value>> {
        self.columns
    }

    /// The block as rows.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        pivot(&self.columns, 0, self.row_count)
    }
}

/// Rows `start..end` of column oriented data.
pub fn pivot(columns: &[Vec<Value>], start: usize, end: usize) -> Vec<Vec<Value>> {
    (start..end)
        .map(|row| {
            columns
                .iter()
                .map(|column| column.get(row).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect()
}
