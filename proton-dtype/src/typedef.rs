use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::{Arg, Node, format_str};

/// A modifier wrapping the base type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Wrapper {
    /// `low_cardinality(T)`: dictionary encoded values.
    LowCardinality,
    /// `nullable(T)`: values preceded by a null map.
    Nullable,
}

impl Wrapper {
    /// The canonical spelling of the wrapper.
    pub fn name(&self) -> &'static str {
        match self {
            Wrapper::LowCardinality => "low_cardinality",
            Wrapper::Nullable => "nullable",
        }
    }

    pub(crate) fn normalized(&self) -> &'static str {
        match self {
            Wrapper::LowCardinality => "lowcardinality",
            Wrapper::Nullable => "nullable",
        }
    }
}

/// A single argument of a parameterized type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeArg {
    /// An integer literal, e.g. a precision or a size.
    Int(i64),
    /// A single-quoted string literal, unescaped, e.g. a time zone.
    Str(String),
    /// Any other expression, most often a nested type name, in canonical spacing.
    Expr(String),
}

impl TypeArg {
    pub(crate) fn from_arg(arg: &Arg) -> Self {
        match arg.single() {
            Some(Node::Word(word)) => word
                .parse::<i64>()
                .map(TypeArg::Int)
                .unwrap_or_else(|_| TypeArg::Expr(word.clone())),
            Some(Node::Quoted { quote: '\'', text }) => TypeArg::Str(text.clone()),
            _ => TypeArg::Expr(arg.to_string()),
        }
    }

    /// The integer value of the argument, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypeArg::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The text of a string or expression argument.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypeArg::Str(s) | TypeArg::Expr(s) => Some(s),
            TypeArg::Int(_) => None,
        }
    }
}

impl Display for TypeArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeArg::Int(v) => write!(f, "{v}"),
            TypeArg::Str(s) => write!(f, "{}", format_str(s)),
            TypeArg::Expr(e) => write!(f, "{e}"),
        }
    }
}

/// The structural description of a parsed type name.
///
/// `wrappers` holds at most one of each [`Wrapper`], outermost first. `keys` carries enum keys,
/// tuple and nested field names, or JSON path names; `values` carries the arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDef {
    wrappers: Vec<Wrapper>,
    keys: Vec<String>,
    values: Vec<TypeArg>,
}

impl TypeDef {
    /// Create a new type definition.
    pub fn new(wrappers: Vec<Wrapper>, keys: Vec<String>, values: Vec<TypeArg>) -> Self {
        Self {
            wrappers,
            keys,
            values,
        }
    }

    /// The wrappers, outermost first.
    pub fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }

    /// The sub-names of the type.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The arguments of the type.
    pub fn values(&self) -> &[TypeArg] {
        &self.values
    }

    /// Whether the type is wrapped in `nullable`.
    pub fn is_nullable(&self) -> bool {
        self.wrappers.contains(&Wrapper::Nullable)
    }

    /// Whether the type is wrapped in `low_cardinality`.
    pub fn is_low_cardinality(&self) -> bool {
        self.wrappers.contains(&Wrapper::LowCardinality)
    }

    /// The arguments rendered as a parenthesized list, or an empty string without arguments.
    pub fn arg_str(&self) -> String {
        if self.values.is_empty() {
            return String::new();
        }
        format!("({})", self.values.iter().join(", "))
    }

    /// Wrap a base type name in this definition's wrappers.
    pub fn wrap_name(&self, base_name: &str) -> String {
        self.wrappers
            .iter()
            .rev()
            .fold(base_name.to_string(), |inner, wrapper| {
                format!("{}({inner})", wrapper.name())
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::{TypeArg, parse_name};

    #[test]
    fn arg_str() {
        let (_, _, def) = parse_name("datetime64(3, 'Asia/Shanghai')").unwrap();
        assert_eq!(
            def.values(),
            [TypeArg::Int(3), TypeArg::Str("Asia/Shanghai".to_string())]
        );
        assert_eq!(def.arg_str(), "(3, 'Asia/Shanghai')");
    }

    #[test]
    fn wrap_name() {
        let (_, _, def) = parse_name("LowCardinality(Nullable(String))").unwrap();
        assert_eq!(def.wrap_name("String"), "low_cardinality(nullable(String))");
    }
}
