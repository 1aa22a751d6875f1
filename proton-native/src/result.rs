use proton_error::ProtonResult;
use proton_io::ByteSource;
use proton_scalar::Value;
use proton_types::{Block, TypeRef, pivot};

use crate::transform::BlockStream;

/// The complete result of a query, gathered from its block stream.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    column_names: Vec<String>,
    column_types: Vec<TypeRef>,
    columns: Vec<Vec<Value>>,
    row_count: usize,
    column_oriented: bool,
}

impl QueryResult {
    /// Read every remaining block of a stream.
    pub fn from_stream<S: ByteSource>(mut stream: BlockStream<S>) -> ProtonResult<Self> {
        let blocks = stream.by_ref().collect::<ProtonResult<Vec<_>>>()?;
        Ok(Self::from_blocks(blocks, stream.context().column_oriented()))
    }

    /// A result built from blocks that have already been decoded.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>, column_oriented: bool) -> Self {
        let mut result = Self {
            column_oriented,
            ..Self::default()
        };
        for block in blocks {
            if result.column_names.is_empty() {
                result.column_names = block.column_names().to_vec();
                result.column_types = block.column_types().to_vec();
            }
            result.row_count += block.row_count();
            let columns = block.into_columns();
            if result.columns.is_empty() {
                result.columns = columns;
            } else {
                for (column, data) in result.columns.iter_mut().zip(columns) {
                    column.extend(data);
                }
            }
        }
        result
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[TypeRef] {
        &self.column_types
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_oriented(&self) -> bool {
        self.column_oriented
    }

    /// The values of each column.
    pub fn result_columns(&self) -> &[Vec<Value>] {
        &self.columns
    }

    /// The values of each row.
    pub fn result_rows(&self) -> Vec<Vec<Value>> {
        pivot(&self.columns, 0, self.row_count)
    }

    /// Columns or rows, as the query asked for.
    pub fn result_set(&self) -> Vec<Vec<Value>> {
        if self.column_oriented {
            self.columns.clone()
        } else {
            self.result_rows()
        }
    }

    pub fn first_row(&self) -> Option<Vec<Value>> {
        pivot(&self.columns, 0, self.row_count.min(1)).into_iter().next()
    }

    /// The first row keyed by column name.
    pub fn first_item(&self) -> Option<Vec<(String, Value)>> {
        self.first_row()
            .map(|row| self.column_names.iter().cloned().zip(row).collect())
    }

    /// Every row keyed by column name.
    pub fn named_results(&self) -> impl Iterator<Item = Vec<(&str, Value)>> + '_ {
        self.result_rows()
            .into_iter()
            .map(|row| self.column_names.iter().map(String::as_str).zip(row).collect())
    }

    pub fn into_columns(self) -> Vec<Vec<Value>> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use proton_types::get_from_name;

    use super::*;

    fn block(keys: &[u32], names: &[&str]) -> Block {
        Block::new(
            vec!["key".to_string(), "name".to_string()],
            vec![get_from_name("uint32").unwrap(), get_from_name("string").unwrap()],
            vec![
                keys.iter().map(|k| Value::from(*k)).collect(),
                names.iter().map(|n| Value::from(*n)).collect(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn blocks_concatenate() {
        let blocks = [block(&[1, 2], &["a", "b"]), block(&[3], &["c"])];
        let result = QueryResult::from_blocks(blocks, false);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.column_names(), ["key".to_string(), "name".to_string()]);
        assert_eq!(
            result.result_columns()[1],
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert_eq!(result.result_rows()[2], vec![Value::UInt(3), Value::from("c")]);
        assert_eq!(result.first_row(), Some(vec![Value::UInt(1), Value::from("a")]));
        assert_eq!(
            result.first_item(),
            Some(vec![
                ("key".to_string(), Value::UInt(1)),
                ("name".to_string(), Value::from("a"))
            ])
        );
        let named: Vec<_> = result.named_results().collect();
        assert_eq!(named[1], vec![("key", Value::UInt(2)), ("name", Value::from("b"))]);
    }

    #[test]
    fn column_oriented_result_set() {
        let result = QueryResult::from_blocks([block(&[1, 2], &["a", "b"])], true);
        assert_eq!(result.result_set(), result.result_columns().to_vec());
        let empty = QueryResult::from_blocks([], false);
        assert!(empty.first_row().is_none());
        assert!(empty.result_rows().is_empty());
    }
}
