pub mod schema;
pub mod record;
pub mod store;
pub mod index;
pub mod registry;
pub mod builtin;
pub mod error;

pub use error::{Result, TextStoreError};
pub use index::StoreIndex;
pub use record::{Record, RecordType};
pub use registry::TypeRegistry;
pub use schema::Schema;
pub use store::Store;
