//! Quoting and escaping shared by type names, identifiers and SQL literals.

/// Escape a string for use inside a single-quoted literal or a quoted identifier.
pub fn escape_str(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '`' => escaped.push_str("\\`"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            '\u{8}' => escaped.push_str("\\b"),
            '\u{c}' => escaped.push_str("\\f"),
            '\u{7}' => escaped.push_str("\\a"),
            '\u{b}' => escaped.push_str("\\v"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Render a string as a single-quoted SQL literal.
pub fn format_str(value: &str) -> String {
    format!("'{}'", escape_str(value))
}

/// Resolve the character following a backslash inside a quoted token.
pub(crate) fn unescape_char(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'a' => '\u{7}',
        'v' => '\u{b}',
        other => other,
    }
}

/// Quote an identifier with backticks unless it is already quoted.
pub fn quote_identifier(identifier: &str) -> String {
    if is_quoted(identifier) {
        return identifier.to_string();
    }
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for c in identifier.chars() {
        if c == '`' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('`');
    quoted
}

/// Strip backticks or double quotes from an identifier, resolving escapes.
pub fn unescape_identifier(identifier: &str) -> String {
    if !is_quoted(identifier) {
        return identifier.to_string();
    }
    let inner = &identifier[1..identifier.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(unescape_char(next));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn is_quoted(identifier: &str) -> bool {
    identifier.len() > 1
        && ((identifier.starts_with('`') && identifier.ends_with('`'))
            || (identifier.starts_with('"') && identifier.ends_with('"')))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("plain", "plain")]
    #[case("it's", "it\\'s")]
    #[case("back\\slash", "back\\\\slash")]
    #[case("line\nbreak\ttab", "line\\nbreak\\ttab")]
    fn escapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_str(input), expected);
    }

    #[test]
    fn identifiers() {
        assert_eq!(quote_identifier("key"), "`key`");
        assert_eq!(quote_identifier("`key`"), "`key`");
        assert_eq!(quote_identifier("a`b"), "`a\\`b`");
        assert_eq!(unescape_identifier("`a\\`b`"), "a`b");
        assert_eq!(unescape_identifier("\"col\""), "col");
        assert_eq!(unescape_identifier("col"), "col");
    }
}
