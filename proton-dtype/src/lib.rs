#![deny(missing_docs)]

//! Type names of the Proton native protocol
//!
//! This crate turns the type names sent by the server (`nullable(string)`,
//! `map(string, array(low_cardinality(string)))`, `enum8('a' = 1)`, ...) into a structural
//! [`TypeDef`], and renders them back in canonical form. Codec construction happens elsewhere;
//! nothing in here knows how a type is encoded on the wire.

pub use node::*;
pub use parser::*;
pub use quote::*;
pub use typedef::*;

mod node;
mod parser;
mod quote;
mod typedef;
