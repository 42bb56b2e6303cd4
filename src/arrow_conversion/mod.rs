//! Arrow data format conversion utilities.
//!
//! This module converts the JSON rows delivered by a cursor into Apache
//! Arrow columnar batches.

mod builders;
mod converter;

pub use builders::build_array;
pub(crate) use builders::{float_value, integer_value};
pub use converter::ArrowConverter;
