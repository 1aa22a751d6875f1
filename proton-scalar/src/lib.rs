//! Values of Proton columns.
//!
//! A [`Value`] is what a codec decodes from a column and what it accepts for insert. The wide
//! integer and decimal types live here too, together with date conversions and the rendering of
//! values as SQL literals for parameter binding.

pub use bigint::*;
pub use datetime::*;
pub use decimal::*;
pub use literal::*;
pub use value::*;

mod bigint;
mod datetime;
mod decimal;
mod literal;
mod value;
