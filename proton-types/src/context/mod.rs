//! Per-call state shared with the codecs while a block is read or written.

use std::collections::HashMap;
use std::sync::Arc;

use proton_error::{ProtonResult, proton_bail};

use crate::format::{Format, FormatPattern, FormatTable};

pub use insert::*;
pub use query::*;

mod insert;
mod query;

/// The override requested for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFormat {
    /// A single format for the column and everything nested in it.
    Simple(Format),
    /// Formats keyed by type pattern, applied at every nesting depth inside the column.
    ByType(FormatTable),
}

/// Column and type overrides as requested by the caller, validated when a context is built.
#[derive(Debug, Clone, Default)]
pub(crate) struct FormatRequests {
    types: Vec<(String, String)>,
    columns: Vec<(String, String)>,
    column_types: Vec<(String, String, String)>,
}

impl FormatRequests {
    pub(crate) fn type_format(&mut self, pattern: &str, format: &str) {
        self.types.push((pattern.to_string(), format.to_string()));
    }

    pub(crate) fn column_format(&mut self, column: &str, format: &str) {
        self.columns.push((column.to_string(), format.to_string()));
    }

    pub(crate) fn column_type_format(&mut self, column: &str, pattern: &str, format: &str) {
        self.column_types
            .push((column.to_string(), pattern.to_string(), format.to_string()));
    }

    pub(crate) fn build(self, defaults: Arc<FormatTable>) -> ProtonResult<FormatOverrides> {
        let types =
            FormatTable::try_from_pairs(self.types.iter().map(|(p, f)| (p.as_str(), f.as_str())))?;
        let mut columns = HashMap::new();
        for (column, format) in self.columns {
            columns.insert(column, ColumnFormat::Simple(format.parse()?));
        }
        for (column, pattern, format) in self.column_types {
            let pattern = FormatPattern::new(&pattern)?;
            let format = format.parse()?;
            match columns
                .entry(column)
                .or_insert_with(|| ColumnFormat::ByType(FormatTable::default()))
            {
                ColumnFormat::ByType(table) => table.set(pattern, format),
                ColumnFormat::Simple(simple) => proton_bail!(
                    Config: "column format {simple} conflicts with {format} for `{}` types",
                    pattern.pattern()
                ),
            }
        }
        Ok(FormatOverrides {
            defaults,
            types,
            columns,
            active: None,
        })
    }
}

/// Resolves the format of a codec from, in order: the active column's simple override, the
/// active column's type patterns, the per-call type patterns, the global defaults and finally the
/// codec's own default. An override a codec does not support falls through to the next layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct FormatOverrides {
    defaults: Arc<FormatTable>,
    types: FormatTable,
    columns: HashMap<String, ColumnFormat>,
    active: Option<String>,
}

impl FormatOverrides {
    pub(crate) fn start_column(&mut self, name: &str) {
        self.active = self.columns.contains_key(name).then(|| name.to_string());
    }

    pub(crate) fn resolve(&self, base: &str, valid: &[Format]) -> Format {
        let column = self.active.as_ref().and_then(|name| self.columns.get(name));
        let from_column = match column {
            Some(ColumnFormat::Simple(format)) => valid.contains(format).then_some(*format),
            Some(ColumnFormat::ByType(table)) => table.resolve(base, valid),
            None => None,
        };
        from_column
            .or_else(|| self.types.resolve(base, valid))
            .or_else(|| self.defaults.resolve(base, valid))
            .or_else(|| valid.first().copied())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: &[Format] = &[Format::Native, Format::String];
    const INT: &[Format] = &[Format::Native, Format::String];
    const UINT64: &[Format] = &[Format::Native, Format::Signed, Format::String];

    #[test]
    fn precedence() {
        let defaults = [("IP*", "string"), ("uint64", "signed")];
        let defaults = Arc::new(FormatTable::try_from_pairs(defaults).unwrap());
        let mut requests = FormatRequests::default();
        requests.type_format("uint64", "string");
        requests.column_format("addr", "native");
        requests.column_type_format("nested", "ipv6", "native");
        let mut overrides = requests.build(defaults).unwrap();

        assert_eq!(overrides.resolve("ipv4", IP), Format::String);
        assert_eq!(overrides.resolve("ipv6", IP), Format::String);
        assert_eq!(overrides.resolve("int32", INT), Format::Native);
        assert_eq!(overrides.resolve("uint64", UINT64), Format::String);

        overrides.start_column("addr");
        assert_eq!(overrides.resolve("ipv4", IP), Format::Native);

        overrides.start_column("nested");
        assert_eq!(overrides.resolve("ipv6", IP), Format::Native);
        assert_eq!(overrides.resolve("ipv4", IP), Format::String);

        overrides.start_column("other");
        assert_eq!(overrides.resolve("ipv6", IP), Format::String);
    }

    #[test]
    fn invalid_override_falls_through() {
        let mut requests = FormatRequests::default();
        requests.column_format("n", "signed");
        let mut overrides = requests.build(Arc::default()).unwrap();
        overrides.start_column("n");
        assert_eq!(overrides.resolve("int32", INT), Format::Native);
        assert_eq!(overrides.resolve("uint64", UINT64), Format::Signed);
    }

    #[test]
    fn conflicting_column_overrides_fail_at_build() {
        let mut requests = FormatRequests::default();
        requests.column_type_format("addr", "ipv*", "string");
        requests.column_format("addr", "native");
        let err = requests.build(Arc::default()).unwrap_err();
        assert!(matches!(err, proton_error::ProtonError::Config(..)));
        assert!(err.to_string().contains("conflicts with string for `ipv*` types"));
    }

    #[test]
    fn unknown_names_fail_at_build() {
        let mut requests = FormatRequests::default();
        requests.column_format("n", "hexadecimal");
        assert!(requests.build(Arc::default()).is_err());
    }
}
