use std::collections::BTreeMap;

use proton_error::{ProtonResult, proton_bail, proton_err};

use crate::quote::unescape_char;
use crate::{Arg, Node, TypeArg, TypeDef, Wrapper, render_terms, unescape_identifier};

/// Recursive-descent parser over a type expression.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn term(&mut self) -> ProtonResult<Node> {
        self.skip_ws();
        match self.peek() {
            None => proton_bail!(Parse: "unexpected end of `{}`", self.src),
            Some(quote @ ('\'' | '`' | '"')) => {
                self.bump();
                self.quoted(quote)
            }
            Some('=') => {
                self.bump();
                Ok(Node::Assign)
            }
            Some(c @ ('(' | ')' | ',')) => {
                proton_bail!(Parse: "unexpected `{c}` at offset {} of `{}`", self.pos, self.src)
            }
            Some(_) => {
                let word = self.word();
                let mark = self.pos;
                self.skip_ws();
                if self.peek() == Some('(') {
                    self.bump();
                    let args = self.args()?;
                    Ok(Node::Call { name: word, args })
                } else {
                    self.pos = mark;
                    Ok(Node::Word(word))
                }
            }
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ',' | '=' | '\'' | '`' | '"') {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn quoted(&mut self, quote: char) -> ProtonResult<Node> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => proton_bail!(Parse: "unterminated {quote} quote in `{}`", self.src),
                Some('\\') => match self.bump() {
                    Some(c) => text.push(unescape_char(c)),
                    None => proton_bail!(Parse: "dangling escape in `{}`", self.src),
                },
                Some(c) if c == quote => return Ok(Node::Quoted { quote, text }),
                Some(c) => text.push(c),
            }
        }
    }

    /// Parse the argument list after an opening parenthesis, through the closing one.
    fn args(&mut self) -> ProtonResult<Vec<Arg>> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }
        loop {
            let mut terms = Vec::new();
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(',' | ')') | None => break,
                    Some(_) => terms.push(self.term()?),
                }
            }
            // an empty argument, as in `map(string, )`, is kept and rendered back empty
            args.push(Arg(terms));
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                _ => proton_bail!(Parse: "unbalanced parentheses in `{}`", self.src),
            }
        }
    }
}

/// Parse a complete type expression into its AST.
pub fn parse_expr(text: &str) -> ProtonResult<Node> {
    let mut parser = Parser::new(text);
    let node = parser.term()?;
    parser.skip_ws();
    if !parser.rest().is_empty() {
        proton_bail!(Parse: "unexpected trailing text `{}` in `{text}`", parser.rest());
    }
    match node {
        Node::Word(_) | Node::Call { .. } => Ok(node),
        _ => proton_bail!(Parse: "`{text}` is not a type name"),
    }
}

/// Parse `name(args...)` and return the name, the argument values and any text left over
/// after the closing parenthesis, e.g. the clauses following a table engine.
pub fn parse_callable(text: &str) -> ProtonResult<(String, Vec<TypeArg>, String)> {
    let mut parser = Parser::new(text);
    let node = parser.term()?;
    let leftover = parser.rest().trim().to_string();
    match node {
        Node::Word(name) => Ok((name, Vec::new(), leftover)),
        Node::Call { name, args } => {
            let args = args.iter().map(TypeArg::from_arg).collect();
            Ok((name, args, leftover))
        }
        _ => proton_bail!(Parse: "`{text}` is not callable"),
    }
}

/// Parse an `enum8(...)`/`enum16(...)` definition into its canonical keys and values.
pub fn parse_enum(text: &str) -> ProtonResult<(Vec<String>, Vec<i64>)> {
    let node = parse_expr(text)?;
    enum_pairs(node.args())
}

/// Parse a column definition list, e.g. `(a string, b array(uint8))`, returning the names
/// (empty when the columns are unnamed) and the type text of each column.
pub fn parse_columns(text: &str) -> ProtonResult<(Vec<String>, Vec<String>)> {
    let node = parse_expr(&format!("columns{text}"))?;
    column_defs(node.args())
}

/// Normalized spelling used to recognize a base type name regardless of case or
/// underscores, so `low_cardinality` and `LowCardinality` compare equal.
pub fn normalize_base(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse a type name into its base name, the original name and its [`TypeDef`].
pub fn parse_name(name: &str) -> ProtonResult<(String, String, TypeDef)> {
    let mut node = parse_expr(name)?;
    let mut wrappers = Vec::new();
    for wrapper in [Wrapper::LowCardinality, Wrapper::Nullable] {
        if let Some(inner) = unwrap_wrapper(&node, wrapper, name)? {
            wrappers.push(wrapper);
            node = inner;
        }
    }
    if let Some(base) = node.name() {
        let norm = normalize_base(base);
        if norm == "lowcardinality" || norm == "nullable" {
            proton_bail!(Parse: "misplaced `{base}` wrapper in `{name}`");
        }
    }

    let (base, keys, values) = match node {
        Node::Word(base) => (base, Vec::new(), Vec::new()),
        Node::Call { name: base, args } => {
            let norm = normalize_base(&base);
            if norm.starts_with("enum") {
                let (keys, values) = enum_pairs(&args)?;
                (base, keys, values.into_iter().map(TypeArg::Int).collect())
            } else if matches!(
                norm.as_str(),
                "nested" | "tuple" | "variant" | "json" | "dynamic"
            ) {
                let (keys, values) = column_defs(&args)?;
                (base, keys, values.into_iter().map(TypeArg::Expr).collect())
            } else {
                let values = args.iter().map(TypeArg::from_arg).collect();
                (base, Vec::new(), values)
            }
        }
        _ => proton_bail!(Parse: "`{name}` is not a type name"),
    };
    Ok((base, name.to_string(), TypeDef::new(wrappers, keys, values)))
}

fn unwrap_wrapper(node: &Node, wrapper: Wrapper, name: &str) -> ProtonResult<Option<Node>> {
    let Node::Call { name: base, args } = node else {
        return Ok(None);
    };
    if normalize_base(base) != wrapper.normalized() {
        return Ok(None);
    }
    match args.as_slice() {
        [arg] => arg
            .single()
            .cloned()
            .map(Some)
            .ok_or_else(|| proton_err!(Parse: "invalid `{base}` argument in `{name}`")),
        _ => proton_bail!(Parse: "`{base}` takes exactly one type in `{name}`"),
    }
}

fn enum_pairs(args: &[Arg]) -> ProtonResult<(Vec<String>, Vec<i64>)> {
    // value -> key and key -> value, later declarations replacing earlier ones
    let mut by_value: BTreeMap<i64, String> = BTreeMap::new();
    let mut by_key: BTreeMap<String, i64> = BTreeMap::new();
    let mut next = 1i64;
    for arg in args {
        let (key, value) = match arg.terms() {
            [Node::Quoted { quote: '\'', text }] => (text.clone(), next),
            [Node::Quoted { quote: '\'', text }, Node::Assign, Node::Word(value)] => {
                let value = value
                    .parse::<i64>()
                    .map_err(|_| proton_err!(Parse: "invalid enum value `{value}` for `{text}`"))?;
                (text.clone(), value)
            }
            _ => proton_bail!(Parse: "invalid enum entry `{arg}`"),
        };
        next = value + 1;
        by_value.insert(value, key.clone());
        by_key.insert(key, value);
    }
    Ok(by_value
        .into_iter()
        .filter(|(value, key)| by_key.get(key) == Some(value))
        .map(|(value, key)| (key, value))
        .unzip())
}

fn column_defs(args: &[Arg]) -> ProtonResult<(Vec<String>, Vec<String>)> {
    let mut keys = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        if let Some((key, value)) = arg.assignment() {
            keys.push(key.to_string());
            values.push(render_terms(value));
            continue;
        }
        match arg.terms() {
            [single] => values.push(single.to_string()),
            [key @ (Node::Word(_) | Node::Quoted { quote: '`' | '"', .. }), rest @ ..] => {
                let key = match key {
                    Node::Quoted { text, .. } => text.clone(),
                    other => unescape_identifier(&other.to_string()),
                };
                keys.push(key);
                values.push(render_terms(rest));
            }
            _ => proton_bail!(Parse: "invalid column definition `{arg}`"),
        }
    }
    if !keys.is_empty() && keys.len() != values.len() {
        proton_bail!(Parse: "mixed named and unnamed elements in `({})`", values.join(", "));
    }
    Ok((keys, values))
}
