//! Type registry: descriptor per registered record type, plus a blank-instance factory.
//! Populated at startup, then shared read-only behind an `Arc`.

use crate::builtin::{Subscription, User};
use crate::error::AppError;
use crate::record::{blank, AnyRecord, Record};
use crate::schema::{describe, RecordTypeDescriptor};
use std::collections::HashMap;

type Factory = fn() -> Box<dyn AnyRecord>;

#[derive(Default)]
pub struct TypeRegistry {
    /// Keyed by lower-cased type name.
    descriptors: HashMap<String, RecordTypeDescriptor>,
    /// Keyed by exact type name.
    factories: HashMap<String, Factory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registry with the built-in types already registered.
    pub fn with_builtins() -> Self {
        let mut registry = TypeRegistry::new();
        registry.register_builtins();
        registry
    }

    /// Compute and store the descriptor of `R`. Registering again replaces the entry.
    pub fn register<R: Record>(&mut self) -> &RecordTypeDescriptor {
        let descriptor = describe::<R>();
        tracing::info!(
            record_type = R::TYPE_NAME,
            table = R::TABLE_NAME,
            fields = descriptor.fields.len(),
            "registered record type"
        );
        self.factories.insert(R::TYPE_NAME.to_string(), blank::<R>);
        let key = R::TYPE_NAME.to_lowercase();
        self.descriptors.insert(key.clone(), descriptor);
        &self.descriptors[&key]
    }

    pub fn register_builtins(&mut self) {
        self.register::<User>();
        self.register::<Subscription>();
    }

    /// Case-insensitive descriptor lookup.
    pub fn lookup(&self, type_name: &str) -> Option<&RecordTypeDescriptor> {
        self.descriptors.get(&type_name.to_lowercase())
    }

    pub fn descriptor(&self, type_name: &str) -> Result<&RecordTypeDescriptor, AppError> {
        self.lookup(type_name)
            .ok_or_else(|| AppError::UnknownType(type_name.to_string()))
    }

    /// Blank instance of the type registered under exactly `type_name`.
    pub fn new_blank_instance(&self, type_name: &str) -> Result<Box<dyn AnyRecord>, AppError> {
        self.factories
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| AppError::UnknownType(type_name.to_string()))
    }

    /// Registered descriptors, in no particular order.
    pub fn types(&self) -> impl Iterator<Item = &RecordTypeDescriptor> {
        self.descriptors.values()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.lookup("USER").unwrap().title, "Users");
        assert!(registry.lookup("nobody").is_none());
        assert!(matches!(registry.descriptor("nobody"), Err(AppError::UnknownType(_))));
    }

    #[test]
    fn blank_instances_use_exact_names() {
        let registry = TypeRegistry::with_builtins();
        let user = registry.new_blank_instance("User").unwrap();
        assert_eq!(user.table_name(), "users");
        assert_eq!(user.display_column(), "username");
        assert!(matches!(registry.new_blank_instance("user"), Err(AppError::UnknownType(_))));
    }

    #[test]
    fn registering_twice_keeps_one_entry() {
        let mut registry = TypeRegistry::new();
        let first = registry.register::<User>().clone();
        let second = registry.register::<User>().clone();
        assert_eq!(first, second);
        assert_eq!(registry.types().count(), 1);
        assert_eq!(registry.lookup("user"), Some(&first));
    }
}
