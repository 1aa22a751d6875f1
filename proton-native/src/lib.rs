//! The block level half of the Proton native driver.
//!
//! [`NativeTransform`] turns response bodies into [`Block`][proton_types::Block]s and insert data
//! into body chunks; [`QueryResult`] gathers a response, and [`binding`] applies query parameters.
//! Transport is left to the caller, which hands over response bodies as a
//! [`ByteSource`][proton_io::ByteSource] and sends the chunks of an insert as they are produced.

pub use async_native::*;
pub use binding::*;
pub use result::*;
pub use settings::*;
pub use transform::*;

mod async_native;
pub mod binding;
mod result;
mod settings;
mod transform;
