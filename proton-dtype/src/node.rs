use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::escape_str;

/// A term of a parsed type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A bare word: an identifier, keyword or number.
    Word(String),
    /// A quoted string or identifier, with escapes resolved.
    Quoted {
        /// The quote character, one of `'`, `` ` `` or `"`.
        quote: char,
        /// The unescaped text between the quotes.
        text: String,
    },
    /// A parameterized expression, `name(arg, arg, ...)`.
    Call {
        /// The name before the opening parenthesis.
        name: String,
        /// The top-level arguments.
        args: Vec<Arg>,
    },
    /// The `=` separating a key from its value.
    Assign,
}

/// One comma separated argument of a [`Node::Call`]: a run of whitespace separated terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg(pub Vec<Node>);

impl Node {
    /// The name of a word or call.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Word(name) | Node::Call { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The arguments of a call, empty for every other term.
    pub fn args(&self) -> &[Arg] {
        match self {
            Node::Call { args, .. } => args,
            _ => &[],
        }
    }
}

impl Arg {
    /// The terms of the argument.
    pub fn terms(&self) -> &[Node] {
        &self.0
    }

    /// The single term of the argument, if it has exactly one.
    pub fn single(&self) -> Option<&Node> {
        match self.0.as_slice() {
            [node] => Some(node),
            _ => None,
        }
    }

    /// Split `key = value` arguments at the assignment.
    pub fn assignment(&self) -> Option<(&Node, &[Node])> {
        match self.0.as_slice() {
            [key, Node::Assign, value @ ..] if !value.is_empty() => Some((key, value)),
            _ => None,
        }
    }
}

/// Render a run of terms separated by single spaces.
pub fn render_terms(terms: &[Node]) -> String {
    terms.iter().join(" ")
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Word(word) => write!(f, "{word}"),
            Node::Quoted { quote, text } => write!(f, "{quote}{}{quote}", escape_str(text)),
            Node::Call { name, args } => write!(f, "{name}({})", args.iter().join(", ")),
            Node::Assign => write!(f, "="),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", render_terms(&self.0))
    }
}
