//! Record types every deployment gets for free.

use crate::record::RecordType;

/// `Line` — any single non-empty line of text, no fields.
pub fn line() -> RecordType {
    RecordType::from_pattern("Line", "^.*$").expect("builtin Line pattern is valid")
}

/// `ToDo` — `TODO: <item>` lines with a single `item` field.
pub fn todo() -> RecordType {
    RecordType::new("ToDo", "TODO: $item").expect("builtin ToDo template is valid")
}
