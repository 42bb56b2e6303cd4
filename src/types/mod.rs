//! Type mapping between engine column types and Arrow data types.

mod mapping;

pub use mapping::{SqlType, TypeMapper};
