//! Binding of query parameters.
//!
//! Typed placeholders, `{name:Type}`, are left in the query and their values sent alongside it as
//! `param_<name>` server parameters, rendered as the text the server parses for that type.
//! Untyped placeholders, `%(name)s` for named parameters and `%s` for positional ones, are
//! replaced in the query text by SQL literals. `%%` stands for a literal `%` wherever untyped
//! placeholders are substituted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use jiff::tz::TimeZone;
use log::trace;
use proton_error::{ContextExt, ProtonResult, proton_bail, proton_err, proton_panic};
use proton_scalar::{Value, format_query_value};
use proton_types::{QueryContext, QueryParams, get_from_name};
use regex::{Captures, Regex};

static TYPED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*([A-Za-z_][0-9A-Za-z_]*)\s*:\s*([^{}]+?)\s*\}")
        .unwrap_or_else(|e| proton_panic!("invalid typed placeholder pattern: {e}"))
});

static UNTYPED_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(?:\(([A-Za-z_][0-9A-Za-z_]*)\)s|s|%)")
        .unwrap_or_else(|e| proton_panic!("invalid untyped placeholder pattern: {e}"))
});

static SQL_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?ms)(".*?"|'.*?')|(/\*.*?\*/|--\s[^\n]*$)"#)
        .unwrap_or_else(|e| proton_panic!("invalid comment pattern: {e}"))
});

/// A query with its parameters applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundQuery {
    pub query: String,
    /// Values of the typed placeholders, keyed `param_<name>`.
    pub server_params: BTreeMap<String, String>,
}

/// Apply `params` to `query`.
///
/// Date times without a zone are rendered in `server_tz` when one is given.
pub fn bind_query(
    query: &str,
    params: &QueryParams,
    server_tz: Option<&TimeZone>,
) -> ProtonResult<BoundQuery> {
    let mut bound = BoundQuery {
        query: query.to_string(),
        server_params: BTreeMap::new(),
    };
    if params.is_empty() {
        return Ok(bound);
    }
    match params {
        QueryParams::Named(values) => {
            let mut typed = BTreeSet::new();
            for caps in TYPED_PLACEHOLDER.captures_iter(query) {
                let (name, type_name) = (group(&caps, 1), group(&caps, 2));
                let Some(value) = values.get(name) else {
                    proton_bail!("missing value for query parameter `{name}`");
                };
                let literal = get_from_name(type_name)?
                    .bind_literal(value, server_tz)
                    .with_context(|| format!("invalid value for query parameter `{name}`"))?;
                trace!("binding server parameter {name} as {type_name}");
                bound.server_params.insert(format!("param_{name}"), literal);
                typed.insert(name.to_string());
            }
            let untyped: BTreeMap<&str, &Value> = values
                .iter()
                .filter(|(name, _)| !typed.contains(*name))
                .map(|(name, value)| (name.as_str(), value))
                .collect();
            if !untyped.is_empty() {
                bound.query = substitute(query, |name| match name {
                    Some(name) => untyped
                        .get(name)
                        .map(|value| format_query_value(value, server_tz))
                        .ok_or_else(|| proton_err!("missing value for query parameter `{name}`")),
                    None => Err(proton_err!(
                        "positional placeholder in a query with named parameters"
                    )),
                })?;
            }
        }
        QueryParams::Positional(values) => {
            let mut remaining = values.iter();
            bound.query = substitute(query, |name| match name {
                Some(name) => Err(proton_err!(
                    "named placeholder `{name}` in a query with positional parameters"
                )),
                None => remaining
                    .next()
                    .map(|value| format_query_value(value, server_tz))
                    .ok_or_else(|| {
                        proton_err!(
                            "query has more placeholders than the {} parameters",
                            values.len()
                        )
                    }),
            })?;
            if remaining.next().is_some() {
                proton_bail!("query has fewer placeholders than the {} parameters", values.len());
            }
        }
    }
    Ok(bound)
}

/// Apply the parameters of a context to its query, replacing the query text.
///
/// Returns the server parameters to send with the query.
pub fn bind_context(ctx: &mut QueryContext) -> ProtonResult<BTreeMap<String, String>> {
    let server_tz = ctx.apply_server_tz().then_some(ctx.server_tz());
    let bound = bind_query(ctx.query(), ctx.parameters(), server_tz)?;
    ctx.set_query(bound.query);
    Ok(bound.server_params)
}

/// Replace the untyped placeholders of `query`, calling `value` with the name of each named
/// placeholder or `None` for a positional one.
fn substitute(
    query: &str,
    mut value: impl FnMut(Option<&str>) -> ProtonResult<String>,
) -> ProtonResult<String> {
    let mut out = String::with_capacity(query.len());
    let mut last = 0;
    for caps in UNTYPED_PLACEHOLDER.captures_iter(query) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&query[last..whole.start()]);
        last = whole.end();
        match whole.as_str() {
            "%%" => out.push('%'),
            "%s" => out.push_str(&value(None)?),
            _ => out.push_str(&value(Some(group(&caps, 1)))?),
        }
    }
    out.push_str(&query[last..]);
    Ok(out)
}

fn group<'a>(caps: &Captures<'a>, ix: usize) -> &'a str {
    caps.get(ix).map_or("", |m| m.as_str())
}

/// Strip `--` line comments and `/* */` block comments, leaving quoted text alone.
pub fn remove_sql_comments(sql: &str) -> String {
    SQL_COMMENT
        .replace_all(sql, |caps: &Captures| group(caps, 1).to_string())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use rstest::rstest;

    use super::*;

    fn named(pairs: &[(&str, Value)]) -> QueryParams {
        QueryParams::Named(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn typed_placeholders_become_server_params() {
        let params = named(&[
            ("v", Value::from(7u8)),
            ("s", Value::from("it's")),
            ("ids", Value::array([1u32, 2])),
        ]);
        let query = "SELECT {v:uint8}, { s : string }, {ids:array(uint32)}";
        let bound = bind_query(query, &params, None).unwrap();
        assert_eq!(bound.query, "SELECT {v:uint8}, { s : string }, {ids:array(uint32)}");
        assert_eq!(
            bound.server_params,
            BTreeMap::from([
                ("param_ids".to_string(), "[1, 2]".to_string()),
                ("param_s".to_string(), "it\\'s".to_string()),
                ("param_v".to_string(), "7".to_string()),
            ])
        );
    }

    #[test]
    fn typed_values_must_fit() {
        let params = named(&[("v", Value::from(300u32))]);
        let err = bind_query("SELECT {v:uint8}", &params, None).unwrap_err();
        assert!(err.is_data_error());
        assert!(bind_query("SELECT {v:uint8}", &named(&[]), None).is_ok());
        assert!(bind_query("SELECT {v:uint8}", &named(&[("w", Value::from(1u8))]), None).is_err());
    }

    #[test]
    fn named_substitution() {
        let params = named(&[
            ("n", Value::from("O'Brien")),
            ("day", Value::from(date(2024, 2, 29))),
        ]);
        let bound = bind_query(
            "SELECT * FROM t WHERE name = %(n)s AND day = %(day)s AND pct LIKE '10%%'",
            &params,
            None,
        )
        .unwrap();
        assert_eq!(
            bound.query,
            "SELECT * FROM t WHERE name = 'O\\'Brien' AND day = '2024-02-29' AND pct LIKE '10%'"
        );
        assert!(bound.server_params.is_empty());
    }

    #[test]
    fn positional_substitution() {
        let params = QueryParams::Positional(vec![
            Value::from(1i32),
            Value::array([1u8, 2]),
            Value::Null,
            Value::tuple([Value::from("a"), Value::from(2.5f64)]),
        ]);
        let bound = bind_query("SELECT %s, %s, %s, %s", &params, None).unwrap();
        assert_eq!(bound.query, "SELECT 1, [1, 2], NULL, ('a', 2.5)");

        let short = QueryParams::Positional(vec![Value::from(1i32)]);
        assert!(bind_query("SELECT %s, %s", &short, None).is_err());
        assert!(bind_query("SELECT 1", &short, None).is_err());
        assert!(bind_query("SELECT %(a)s", &short, None).is_err());
    }

    #[test]
    fn no_params_leaves_query_alone() {
        let params = QueryParams::Positional(Vec::new());
        let bound = bind_query("SELECT '100%'", &params, None).unwrap();
        assert_eq!(bound.query, "SELECT '100%'");
    }

    #[test]
    fn context_binding() {
        let mut ctx = QueryContext::builder("SELECT {a:int32}, %(b)s")
            .named_parameter("a", -4i32)
            .named_parameter("b", "x")
            .build()
            .unwrap();
        let server_params = bind_context(&mut ctx).unwrap();
        assert_eq!(ctx.query(), "SELECT {a:int32}, 'x'");
        assert_eq!(server_params.get("param_a").map(String::as_str), Some("-4"));
    }

    #[rstest]
    #[case("SELECT 1 -- trailing\nFROM t", "SELECT 1 \nFROM t")]
    #[case("SELECT /* inline */ 2", "SELECT  2")]
    #[case("SELECT '-- not a comment', \"/* nor */\"", "SELECT '-- not a comment', \"/* nor */\"")]
    #[case("SELECT /* multi\nline */ 3", "SELECT  3")]
    fn comments(#[case] sql: &str, #[case] expected: &str) {
        assert_eq!(remove_sql_comments(sql), expected);
    }
}
