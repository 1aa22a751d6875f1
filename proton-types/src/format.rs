//! Representations of decoded values and the process-wide table of default representations.
//!
//! Every codec decodes into its `native` representation unless a different [`Format`] is
//! requested. Requests come from the column and query overrides of a context or from the global
//! defaults installed here; contexts capture a snapshot of the defaults when they are built, so
//! changing the defaults never affects a call already in flight.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use itertools::Itertools;
use log::debug;
use parking_lot::RwLock;
use proton_dtype::normalize_base;
use proton_error::{ProtonError, ProtonResult, proton_bail, proton_err};
use regex::Regex;

/// The representation a column is decoded into or encoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Native,
    /// Text, e.g. UUIDs and IP addresses as strings.
    String,
    /// Raw bytes for string columns.
    Bytes,
    /// 64-bit unsigned integers reinterpreted as signed.
    Signed,
    /// Dates, times and enums as their integer wire values.
    Int,
    /// Tuples as objects keyed by element name.
    Dict,
    /// Tuples as JSON text.
    Json,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Native => "native",
            Format::String => "string",
            Format::Bytes => "bytes",
            Format::Signed => "signed",
            Format::Int => "int",
            Format::Dict => "dict",
            Format::Json => "json",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Format {
    type Err = ProtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "native" => Format::Native,
            "string" | "str" => Format::String,
            "bytes" => Format::Bytes,
            "signed" => Format::Signed,
            "int" => Format::Int,
            "dict" => Format::Dict,
            "json" => Format::Json,
            other => proton_bail!(Config: "unrecognized format `{other}`"),
        })
    }
}

/// A type name pattern such as `IP*` or `uint64`.
///
/// Patterns ignore case and underscores, and match from the start of the base type name with
/// `*` standing for any run of characters.
#[derive(Debug, Clone)]
pub struct FormatPattern {
    pattern: String,
    regex: Regex,
}

impl FormatPattern {
    pub fn new(pattern: &str) -> ProtonResult<Self> {
        let pattern = normalize_base(pattern.trim());
        if pattern.is_empty() {
            proton_bail!(Config: "empty type pattern");
        }
        let source = format!(
            "(?i)^{}",
            pattern.split('*').map(regex::escape).join(".*")
        );
        let regex = Regex::new(&source)
            .map_err(|e| proton_err!(Config: "invalid type pattern `{pattern}`: {e}"))?;
        Ok(Self { pattern, regex })
    }

    /// The normalized pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern matches a base type name.
    pub fn matches(&self, base: &str) -> bool {
        self.regex.is_match(&normalize_base(base))
    }
}

impl PartialEq for FormatPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for FormatPattern {}

/// An ordered list of pattern overrides; the first matching pattern valid for a codec wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatTable(Vec<(FormatPattern, Format)>);

impl FormatTable {
    /// Parse `(pattern, format)` pairs.
    pub fn try_from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> ProtonResult<Self> {
        let mut table = FormatTable::default();
        for (pattern, format) in pairs {
            table.set(FormatPattern::new(pattern)?, format.parse()?);
        }
        Ok(table)
    }

    /// Add an override, replacing the format of an identical pattern in place.
    pub fn set(&mut self, pattern: FormatPattern, format: Format) {
        match self.0.iter_mut().find(|(p, _)| *p == pattern) {
            Some(entry) => entry.1 = format,
            None => self.0.push((pattern, format)),
        }
    }

    /// Remove the override for a pattern, returning whether one was present.
    pub fn remove(&mut self, pattern: &FormatPattern) -> bool {
        let len = self.0.len();
        self.0.retain(|(p, _)| p != pattern);
        self.0.len() != len
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The first format whose pattern matches `base` and that the codec supports.
    pub fn resolve(&self, base: &str, valid: &[Format]) -> Option<Format> {
        self.0
            .iter()
            .find(|(pattern, format)| valid.contains(format) && pattern.matches(base))
            .map(|(_, format)| *format)
    }
}

/// A snapshot of the global default formats, for both directions.
#[derive(Debug, Clone, Default)]
pub struct FormatSnapshot {
    pub read: Arc<FormatTable>,
    pub write: Arc<FormatTable>,
}

static READ_FORMATS: LazyLock<RwLock<Arc<FormatTable>>> = LazyLock::new(RwLock::default);
static WRITE_FORMATS: LazyLock<RwLock<Arc<FormatTable>>> = LazyLock::new(RwLock::default);

fn update(table: &RwLock<Arc<FormatTable>>, f: impl FnOnce(&mut FormatTable)) {
    let mut guard = table.write();
    f(Arc::make_mut(&mut guard));
}

/// Set the default read format for types matching `pattern`.
pub fn set_read_format(pattern: &str, format: &str) -> ProtonResult<()> {
    let pattern = FormatPattern::new(pattern)?;
    let format = format.parse()?;
    debug!("default read format for `{}` set to {format}", pattern.pattern());
    update(&READ_FORMATS, |table| table.set(pattern, format));
    Ok(())
}

/// Set the default write format for types matching `pattern`.
pub fn set_write_format(pattern: &str, format: &str) -> ProtonResult<()> {
    let pattern = FormatPattern::new(pattern)?;
    let format = format.parse()?;
    debug!("default write format for `{}` set to {format}", pattern.pattern());
    update(&WRITE_FORMATS, |table| table.set(pattern, format));
    Ok(())
}

/// Replace all default read formats. Nothing changes if any pair is invalid.
pub fn set_default_formats<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> ProtonResult<()> {
    let table = FormatTable::try_from_pairs(pairs)?;
    debug!("installing {} default read formats", table.len());
    *READ_FORMATS.write() = Arc::new(table);
    Ok(())
}

/// Remove the default read format of a pattern.
pub fn clear_read_format(pattern: &str) -> ProtonResult<bool> {
    let pattern = FormatPattern::new(pattern)?;
    let mut removed = false;
    update(&READ_FORMATS, |table| removed = table.remove(&pattern));
    Ok(removed)
}

/// Remove the default write format of a pattern.
pub fn clear_write_format(pattern: &str) -> ProtonResult<bool> {
    let pattern = FormatPattern::new(pattern)?;
    let mut removed = false;
    update(&WRITE_FORMATS, |table| removed = table.remove(&pattern));
    Ok(removed)
}

/// Remove every default format, in both directions.
pub fn clear_default_formats() {
    debug!("clearing default formats");
    *READ_FORMATS.write() = Arc::default();
    *WRITE_FORMATS.write() = Arc::default();
}

/// Capture the current defaults.
pub fn format_snapshot() -> FormatSnapshot {
    FormatSnapshot {
        read: READ_FORMATS.read().clone(),
        write: WRITE_FORMATS.read().clone(),
    }
}
