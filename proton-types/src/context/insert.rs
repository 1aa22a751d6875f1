use std::collections::BTreeMap;
use std::vec;

use bytes::Bytes;
use itertools::Itertools;
use log::debug;
use proton_dtype::quote_identifier;
use proton_error::{ProtonResult, proton_bail};
use proton_io::Compression;
use proton_scalar::Value;

use crate::block::Block;
use crate::column_type::TypeRef;
use crate::context::{FormatOverrides, FormatRequests};
use crate::format::{Format, format_snapshot};

/// Default encoded size of an insert block.
pub const DEFAULT_BLOCK_BYTES: usize = 1 << 21;

/// Number of leading rows sampled to estimate the encoded size of a row.
const SIZE_SAMPLE_ROWS: usize = 100;

/// Data to insert, either as rows or as columns.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertData {
    Rows(Vec<Vec<Value>>),
    Columns(Vec<Vec<Value>>),
}

impl InsertData {
    pub fn row_count(&self) -> usize {
        match self {
            InsertData::Rows(rows) => rows.len(),
            InsertData::Columns(columns) => columns.first().map_or(0, Vec::len),
        }
    }
}

#[derive(Debug)]
enum DataCursor {
    Rows(vec::IntoIter<Vec<Value>>),
    Columns(Vec<vec::IntoIter<Value>>),
}

/// The state of one insert: the target columns, the data, and how it is split into blocks.
#[derive(Debug)]
pub struct InsertContext {
    table: String,
    column_names: Vec<String>,
    column_types: Vec<TypeRef>,
    data: Option<DataCursor>,
    formats: FormatOverrides,
    settings: BTreeMap<String, String>,
    compression: Compression,
    block_size: Option<usize>,
    block_bytes: usize,
    block_row_count: usize,
    row_count: usize,
    current_row: usize,
    current_block: usize,
}

impl InsertContext {
    pub fn builder(
        table: impl Into<String>,
        column_names: Vec<String>,
        column_types: Vec<TypeRef>,
    ) -> InsertContextBuilder {
        InsertContextBuilder {
            table: table.into(),
            column_names,
            column_types,
            data: None,
            requests: FormatRequests::default(),
            settings: BTreeMap::new(),
            compression: Compression::None,
            block_size: None,
            block_bytes: DEFAULT_BLOCK_BYTES,
        }
    }

    /// A context with no columns, for encoding standalone values.
    pub fn detached() -> Self {
        Self {
            table: String::new(),
            column_names: Vec::new(),
            column_types: Vec::new(),
            data: None,
            formats: FormatOverrides::default(),
            settings: BTreeMap::new(),
            compression: Compression::None,
            block_size: None,
            block_bytes: DEFAULT_BLOCK_BYTES,
            block_row_count: 1 << DEFAULT_BLOCK_BYTES.ilog2(),
            row_count: 0,
            current_row: 0,
            current_block: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[TypeRef] {
        &self.column_types
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// The number of rows in each block.
    pub fn block_row_count(&self) -> usize {
        self.block_row_count
    }

    /// The number of blocks produced so far.
    pub fn current_block(&self) -> usize {
        self.current_block
    }

    /// Mark `name` as the column being encoded.
    pub fn start_column(&mut self, name: &str) {
        self.formats.start_column(name);
    }

    /// The write format of a codec with base type `base`.
    pub fn write_format(&self, base: &str, valid: &[Format]) -> Format {
        self.formats.resolve(base, valid)
    }

    /// Replace the data to insert and restart block production.
    pub fn set_data(&mut self, data: InsertData) -> ProtonResult<()> {
        if let InsertData::Columns(columns) = &data {
            if columns.len() != self.column_names.len() {
                proton_bail!(
                    Data: "{} data columns do not match the {} insert columns",
                    columns.len(),
                    self.column_names.len()
                );
            }
            if let Some(column) = columns.iter().find(|c| c.len() != data.row_count()) {
                proton_bail!(
                    Data: "insert column of {} rows does not match the first column of {} rows",
                    column.len(),
                    data.row_count()
                );
            }
        }
        self.row_count = data.row_count();
        self.block_row_count = self.compute_block_row_count(&data);
        self.current_row = 0;
        self.current_block = 0;
        debug!(
            "inserting {} rows into `{}` in blocks of {} rows",
            self.row_count, self.table, self.block_row_count
        );
        self.data = Some(match data {
            InsertData::Rows(rows) => DataCursor::Rows(rows.into_iter()),
            InsertData::Columns(columns) => {
                DataCursor::Columns(columns.into_iter().map(Vec::into_iter).collect())
            }
        });
        Ok(())
    }

    fn compute_block_row_count(&self, data: &InsertData) -> usize {
        if let Some(block_size) = self.block_size {
            return block_size.max(1);
        }
        let sample_rows = data.row_count().min(SIZE_SAMPLE_ROWS);
        let row_size: usize = match data {
            InsertData::Columns(columns) => self
                .column_types
                .iter()
                .zip(columns)
                .map(|(col_type, column)| col_type.data_size(&column[..sample_rows]))
                .sum(),
            InsertData::Rows(rows) => self
                .column_types
                .iter()
                .enumerate()
                .map(|(ix, col_type)| {
                    let sample: Vec<Value> = rows[..sample_rows]
                        .iter()
                        .filter_map(|row| row.get(ix).cloned())
                        .collect();
                    col_type.data_size(&sample)
                })
                .sum(),
        };
        block_row_count(self.block_bytes, row_size)
    }

    /// The text sent ahead of the first block.
    pub fn insert_prefix(&self) -> String {
        format!(
            "INSERT INTO {} ({}) FORMAT Native\n",
            self.table,
            self.column_names.iter().map(|name| quote_identifier(name)).join(", ")
        )
    }

    /// The next block of at most [`Self::block_row_count`] rows, or `None` once the data is
    /// exhausted. The first block carries the `INSERT` statement as its prefix.
    pub fn next_block(&mut self) -> Option<ProtonResult<Block>> {
        let remaining = self.row_count - self.current_row;
        if remaining == 0 && (self.current_block > 0 || self.data.is_none()) {
            return None;
        }
        let rows = remaining.min(self.block_row_count);
        let columns = match self.data.as_mut()? {
            DataCursor::Columns(columns) => columns
                .iter_mut()
                .map(|column| column.by_ref().take(rows).collect())
                .collect(),
            DataCursor::Rows(iter) => {
                match pivot_rows(iter.by_ref().take(rows), self.column_names.len()) {
                    Ok(columns) => columns,
                    Err(e) => return Some(Err(e)),
                }
            }
        };
        let block = Block::new(self.column_names.clone(), self.column_types.clone(), columns);
        let block = if self.current_block == 0 {
            block.map(|b| b.with_prefix(Bytes::from(self.insert_prefix())))
        } else {
            block
        };
        self.current_row += rows;
        self.current_block += 1;
        Some(block)
    }
}

/// Rows per block for a byte budget and an estimated row size: the largest power of two whose
/// blocks stay within the budget, between one row and `block_bytes` rows.
pub fn block_row_count(block_bytes: usize, row_size: usize) -> usize {
    let max_exp = block_bytes.max(1).ilog2();
    let exp = match row_size {
        0 => max_exp,
        size => max_exp.saturating_sub(size.ilog2()),
    };
    1 << exp
}

fn pivot_rows(
    rows: impl Iterator<Item = Vec<Value>>,
    width: usize,
) -> ProtonResult<Vec<Vec<Value>>> {
    let mut columns: Vec<Vec<Value>> = (0..width).map(|_| Vec::new()).collect();
    for row in rows {
        if row.len() != width {
            proton_bail!(
                Data: "insert row of {} values does not match the {width} insert columns",
                row.len()
            );
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    Ok(columns)
}

/// Builds an [`InsertContext`], validating every requested format.
#[derive(Debug)]
pub struct InsertContextBuilder {
    table: String,
    column_names: Vec<String>,
    column_types: Vec<TypeRef>,
    data: Option<InsertData>,
    requests: FormatRequests,
    settings: BTreeMap<String, String>,
    compression: Compression,
    block_size: Option<usize>,
    block_bytes: usize,
}

impl InsertContextBuilder {
    pub fn data(mut self, data: InsertData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Encode the whole of `column` from `format`.
    pub fn column_format(mut self, column: &str, format: &str) -> Self {
        self.requests.column_format(column, format);
        self
    }

    /// Encode types matching `pattern` from `format`.
    pub fn type_format(mut self, pattern: &str, format: &str) -> Self {
        self.requests.type_format(pattern, format);
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// A fixed number of rows per block, instead of one estimated from the data.
    pub fn block_size(mut self, rows: usize) -> Self {
        self.block_size = Some(rows);
        self
    }

    /// The byte budget used to estimate rows per block.
    pub fn block_bytes(mut self, bytes: usize) -> Self {
        self.block_bytes = bytes;
        self
    }

    pub fn build(self) -> ProtonResult<InsertContext> {
        if self.column_names.len() != self.column_types.len() {
            proton_bail!(
                "{} insert column names do not match {} column types",
                self.column_names.len(),
                self.column_types.len()
            );
        }
        let formats = self.requests.build(format_snapshot().write)?;
        let mut ctx = InsertContext {
            table: self.table,
            column_names: self.column_names,
            column_types: self.column_types,
            data: None,
            formats,
            settings: self.settings,
            compression: self.compression,
            block_size: self.block_size,
            block_bytes: self.block_bytes,
            block_row_count: 1,
            row_count: 0,
            current_row: 0,
            current_block: 0,
        };
        if let Some(data) = self.data {
            ctx.set_data(data)?;
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::registry::get_from_name;

    fn context(names: &[&str], types: &[&str]) -> InsertContextBuilder {
        InsertContext::builder(
            "test_table",
            names.iter().map(|n| n.to_string()).collect(),
            types.iter().map(|t| get_from_name(t).unwrap()).collect(),
        )
    }

    #[test]
    fn fixed_width_rows() {
        let rows: Vec<Vec<Value>> = (0..200u64)
            .map(|i| {
                vec![
                    Value::from(i),
                    Value::tuple([Value::from("2023-01-01"), Value::from("2023-01-01 10:00:00")]),
                ]
            })
            .collect();
        let ctx = context(&["key", "pair"], &["uint64", "tuple(date, datetime)"])
            .data(InsertData::Rows(rows))
            .build()
            .unwrap();
        assert_eq!(ctx.block_row_count(), 262_144);
    }

    #[test]
    fn wide_string_rows() {
        let columns = vec![
            (0..50i32).map(Value::from).collect(),
            (0..50).map(|_| Value::from("x".repeat(400))).collect(),
        ];
        let ctx = context(&["key", "text"], &["int32", "string"])
            .data(InsertData::Columns(columns))
            .build()
            .unwrap();
        assert_eq!(ctx.block_row_count(), 8_192);
    }

    #[rstest]
    #[case(0, 2_097_152)]
    #[case(1, 2_097_152)]
    #[case(14, 262_144)]
    #[case(405, 8_192)]
    #[case(1 << 30, 1)]
    fn sizing(#[case] row_size: usize, #[case] expected: usize) {
        assert_eq!(block_row_count(DEFAULT_BLOCK_BYTES, row_size), expected);
    }

    #[test]
    fn blocks_split_rows() {
        let rows: Vec<Vec<Value>> = (0..5u32).map(|i| vec![Value::from(i)]).collect();
        let mut ctx = context(&["v"], &["uint32"])
            .block_size(2)
            .data(InsertData::Rows(rows))
            .build()
            .unwrap();
        let mut sizes = Vec::new();
        let mut prefixes = Vec::new();
        while let Some(block) = ctx.next_block() {
            let block = block.unwrap();
            sizes.push(block.row_count());
            prefixes.push(block.prefix().map(|p| String::from_utf8(p.to_vec()).unwrap()));
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            prefixes[0].as_deref(),
            Some("INSERT INTO test_table (`v`) FORMAT Native\n")
        );
        assert!(prefixes[1..].iter().all(Option::is_none));
        assert_eq!(ctx.current_block(), 3);
    }

    #[test]
    fn ragged_rows_are_data_errors() {
        let rows = vec![vec![Value::from(1u8)], vec![Value::from(1u8), Value::from(2u8)]];
        let mut ctx = context(&["v"], &["uint8"]).data(InsertData::Rows(rows)).build().unwrap();
        assert!(ctx.next_block().unwrap().unwrap_err().is_data_error());
    }

    #[test]
    fn empty_data_yields_one_empty_block() {
        let mut ctx = context(&["v"], &["uint8"])
            .data(InsertData::Columns(vec![Vec::new()]))
            .build()
            .unwrap();
        assert_eq!(ctx.next_block().unwrap().unwrap().row_count(), 0);
        assert!(ctx.next_block().is_none());
    }
}
