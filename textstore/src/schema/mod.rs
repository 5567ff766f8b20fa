pub mod parser;
pub mod types;

pub use types::{FieldKind, Schema, Token};
