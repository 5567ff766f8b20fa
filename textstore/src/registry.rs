use crate::builtin;
use crate::error::{Result, TextStoreError};
use crate::record::RecordType;
use std::collections::HashMap;
use std::sync::Arc;

/// Explicit registry of record type implementations, keyed by name.
///
/// Populated once at startup (by a plugin-loading layer or by hand) and
/// consumed read-only afterwards; the core looks types up by name and fails
/// with `UnknownRecordType` when a name is absent.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<RecordType>>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// A registry pre-populated with the built-in types (`Line`, `ToDo`).
    pub fn with_builtins() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register(builtin::line());
        registry.register(builtin::todo());
        registry
    }

    /// Register a record type under its own name. Re-registering a name
    /// replaces the previous type.
    pub fn register(&mut self, record_type: RecordType) {
        let name = record_type.name().to_string();
        if self
            .types
            .insert(name.clone(), Arc::new(record_type))
            .is_some()
        {
            log::warn!("record type '{name}' was re-registered");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<RecordType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| TextStoreError::UnknownRecordType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.names(), ["Line", "ToDo"]);
        assert!(registry.get("ToDo").is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        let result = registry.get("Line");
        assert!(matches!(
            result,
            Err(TextStoreError::UnknownRecordType(_))
        ));
    }

    #[test]
    fn test_register_custom_type() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(RecordType::new("KeyValue", "$key = $value").unwrap());
        assert!(registry.contains("KeyValue"));
        assert_eq!(registry.get("KeyValue").unwrap().name(), "KeyValue");
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = TypeRegistry::new();
        registry.register(RecordType::new("ToDo", "TODO: $item").unwrap());
        registry.register(RecordType::new("ToDo", "todo! $item").unwrap());
        let ty = registry.get("ToDo").unwrap();
        assert_eq!(ty.schema().template(), "todo! $item");
    }
}
