use std::collections::{BTreeMap, HashMap};

use jiff::tz::TimeZone;
use proton_error::ProtonResult;
use proton_scalar::{Value, is_utc};

use crate::context::{FormatOverrides, FormatRequests};
use crate::format::{Format, format_snapshot};

/// Parameters of a query, bound by name (`{name:Type}`, `%(name)s`) or by position (`%s`).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParams {
    Named(BTreeMap<String, Value>),
    Positional(Vec<Value>),
}

impl Default for QueryParams {
    fn default() -> Self {
        QueryParams::Named(BTreeMap::new())
    }
}

impl QueryParams {
    pub fn is_empty(&self) -> bool {
        match self {
            QueryParams::Named(params) => params.is_empty(),
            QueryParams::Positional(params) => params.is_empty(),
        }
    }
}

/// The state of one query: its text and parameters, how values are decoded, and which column is
/// being read.
#[derive(Debug, Clone)]
pub struct QueryContext {
    query: String,
    parameters: QueryParams,
    settings: BTreeMap<String, String>,
    formats: FormatOverrides,
    query_tz: Option<TimeZone>,
    column_tzs: HashMap<String, TimeZone>,
    server_tz: TimeZone,
    apply_server_tz: bool,
    active_column: Option<String>,
    use_none: bool,
    use_extended_dtypes: bool,
    use_numpy: bool,
    column_oriented: bool,
    block_info: bool,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            query: String::new(),
            parameters: QueryParams::default(),
            settings: BTreeMap::new(),
            formats: FormatOverrides::default(),
            query_tz: None,
            column_tzs: HashMap::new(),
            server_tz: TimeZone::UTC,
            apply_server_tz: false,
            active_column: None,
            use_none: true,
            use_extended_dtypes: false,
            use_numpy: false,
            column_oriented: false,
            block_info: false,
        }
    }
}

impl QueryContext {
    pub fn builder(query: impl Into<String>) -> QueryContextBuilder {
        QueryContextBuilder {
            ctx: QueryContext {
                query: query.into(),
                ..QueryContext::default()
            },
            requests: FormatRequests::default(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn parameters(&self) -> &QueryParams {
        &self.parameters
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    /// Decode nulls as [`Value::Null`] rather than the zero value of the column type.
    pub fn use_none(&self) -> bool {
        self.use_none
    }

    pub fn use_extended_dtypes(&self) -> bool {
        self.use_extended_dtypes
    }

    pub fn use_numpy(&self) -> bool {
        self.use_numpy
    }

    /// Whether results are kept column oriented.
    pub fn column_oriented(&self) -> bool {
        self.column_oriented
    }

    /// Whether each block is preceded by an 8 byte block info header.
    pub fn block_info(&self) -> bool {
        self.block_info
    }

    pub fn server_tz(&self) -> &TimeZone {
        &self.server_tz
    }

    pub fn apply_server_tz(&self) -> bool {
        self.apply_server_tz
    }

    /// Mark `name` as the column being decoded. Column overrides apply to everything read until
    /// the next column starts.
    pub fn start_column(&mut self, name: &str) {
        self.formats.start_column(name);
        self.active_column = Some(name.to_string());
    }

    pub fn active_column(&self) -> Option<&str> {
        self.active_column.as_deref()
    }

    /// The read format of a codec with base type `base`.
    pub fn read_format(&self, base: &str, valid: &[Format]) -> Format {
        self.formats.resolve(base, valid)
    }

    /// The zone date times are decoded in: the active column's zone, then the zone of the type,
    /// the query, and finally the server's when requested. `None` means naive UTC.
    pub fn active_tz(&self, type_tz: Option<&TimeZone>) -> Option<TimeZone> {
        let column_tz = self
            .active_column
            .as_ref()
            .and_then(|name| self.column_tzs.get(name));
        let server_tz = self.apply_server_tz.then_some(&self.server_tz);
        column_tz
            .or(type_tz)
            .or(self.query_tz.as_ref())
            .or(server_tz)
            .filter(|tz| !is_utc(tz))
            .cloned()
    }

    /// A copy of this context bound to new parameters, for repeated execution.
    pub fn updated_copy(&self, parameters: QueryParams) -> Self {
        let mut copy = self.clone();
        copy.parameters = parameters;
        copy.active_column = None;
        copy.formats.start_column("");
        copy
    }

    /// Replace the query text, e.g. once parameters have been substituted.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }
}

/// Builds a [`QueryContext`], validating every requested format.
#[derive(Debug)]
pub struct QueryContextBuilder {
    ctx: QueryContext,
    requests: FormatRequests,
}

impl QueryContextBuilder {
    pub fn parameters(mut self, parameters: QueryParams) -> Self {
        self.ctx.parameters = parameters;
        self
    }

    pub fn named_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self.ctx.parameters {
            QueryParams::Named(params) => {
                params.insert(name.into(), value.into());
            }
            QueryParams::Positional(_) => {
                self.ctx.parameters =
                    QueryParams::Named(BTreeMap::from([(name.into(), value.into())]));
            }
        }
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.settings.insert(key.into(), value.into());
        self
    }

    /// Read types matching `pattern` in `format` for this query.
    pub fn query_format(mut self, pattern: &str, format: &str) -> Self {
        self.requests.type_format(pattern, format);
        self
    }

    /// Read the whole of `column` in `format`.
    pub fn column_format(mut self, column: &str, format: &str) -> Self {
        self.requests.column_format(column, format);
        self
    }

    /// Read types matching `pattern` inside `column` in `format`.
    pub fn column_type_format(mut self, column: &str, pattern: &str, format: &str) -> Self {
        self.requests.column_type_format(column, pattern, format);
        self
    }

    pub fn query_tz(mut self, tz: TimeZone) -> Self {
        self.ctx.query_tz = Some(tz);
        self
    }

    pub fn column_tz(mut self, column: impl Into<String>, tz: TimeZone) -> Self {
        self.ctx.column_tzs.insert(column.into(), tz);
        self
    }

    pub fn server_tz(mut self, tz: TimeZone, apply: bool) -> Self {
        self.ctx.server_tz = tz;
        self.ctx.apply_server_tz = apply;
        self
    }

    pub fn use_none(mut self, use_none: bool) -> Self {
        self.ctx.use_none = use_none;
        self
    }

    pub fn use_extended_dtypes(mut self, value: bool) -> Self {
        self.ctx.use_extended_dtypes = value;
        self
    }

    pub fn use_numpy(mut self, value: bool) -> Self {
        self.ctx.use_numpy = value;
        self
    }

    pub fn column_oriented(mut self, value: bool) -> Self {
        self.ctx.column_oriented = value;
        self
    }

    pub fn block_info(mut self, value: bool) -> Self {
        self.ctx.block_info = value;
        self
    }

    pub fn build(self) -> ProtonResult<QueryContext> {
        let QueryContextBuilder { mut ctx, requests } = self;
        ctx.formats = requests.build(format_snapshot().read)?;
        Ok(ctx)
    }
}
