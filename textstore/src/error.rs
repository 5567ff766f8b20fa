use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextStoreError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No match: {text:?} is not a valid {type_name}")]
    NoMatch { type_name: String, text: String },

    #[error("Invalid entry for {type_name}: {text:?}")]
    InvalidEntry { type_name: String, text: String },

    #[error("Entry not found: {0:?}")]
    EntryNotFound(String),

    #[error("Store not found: {0}")]
    NotFound(String),

    #[error("Duplicate store name: {0}")]
    DuplicateName(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TextStoreError>;
