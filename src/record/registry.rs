//! Registry of entity schema descriptors.
//!
//! Built once at startup and read-only afterwards.

use super::Entity;
use crate::core::db::{Database, MaterializeReport, SchemaDescriptor};
use crate::core::{RecordError, Result};
use std::any::TypeId;
use std::collections::HashMap;

/// Descriptors keyed by entity type, in registration order.
#[derive(Debug)]
pub struct SchemaRegistry {
    entries: Vec<&'static SchemaDescriptor>,
    by_type: HashMap<TypeId, usize>,
}

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    entries: Vec<(TypeId, &'static SchemaDescriptor)>,
}

impl SchemaRegistryBuilder {
    /// Registers `E`. Register relation targets before the entities that
    /// reference them.
    pub fn register<E: Entity>(mut self) -> Self {
        self.entries.push((TypeId::of::<E>(), E::schema()));
        self
    }

    /// # Errors
    ///
    /// `Schema` when a type is registered twice or two types share a table.
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut registry = SchemaRegistry {
            entries: Vec::with_capacity(self.entries.len()),
            by_type: HashMap::new(),
        };

        for (type_id, schema) in self.entries {
            if registry.by_type.contains_key(&type_id) {
                return Err(RecordError::Schema(format!(
                    "entity for table `{}` registered twice",
                    schema.table()
                )));
            }
            if registry.by_table(schema.table()).is_some() {
                return Err(RecordError::Schema(format!(
                    "table `{}` is declared by more than one entity",
                    schema.table()
                )));
            }
            registry.by_type.insert(type_id, registry.entries.len());
            registry.entries.push(schema);
        }

        Ok(registry)
    }
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn get<E: Entity>(&self) -> Option<&'static SchemaDescriptor> {
        self.by_type
            .get(&TypeId::of::<E>())
            .map(|&index| self.entries[index])
    }

    pub fn by_table(&self, table: &str) -> Option<&'static SchemaDescriptor> {
        self.entries.iter().copied().find(|schema| schema.table() == table)
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &'static SchemaDescriptor> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materializes every registered descriptor in registration order,
    /// stopping at the first failure.
    pub fn materialize_all(&self, db: &Database) -> Result<Vec<MaterializeReport>> {
        let schema = db.schema();
        self.iter().map(|descriptor| schema.materialize(descriptor)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DatabaseFixture, Post, User};

    #[test]
    fn test_lookup_by_type_and_table() {
        let registry = SchemaRegistry::builder()
            .register::<User>()
            .register::<Post>()
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get::<User>().unwrap().table(), "users");
        assert_eq!(registry.by_table("posts").unwrap().table(), "posts");
        assert!(registry.by_table("comments").is_none());

        let tables: Vec<&str> = registry.iter().map(|s| s.table()).collect();
        assert_eq!(tables, vec!["users", "posts"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = SchemaRegistry::builder()
            .register::<User>()
            .register::<User>()
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::Schema(_)));
    }

    #[test]
    fn test_materialize_all_in_order() {
        let fixture = DatabaseFixture::new(false).unwrap();
        let registry = SchemaRegistry::builder()
            .register::<User>()
            .register::<Post>()
            .build()
            .unwrap();

        let reports = registry.materialize_all(&fixture.db).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.table_created));
        assert_eq!(reports[1].relations_added, 1);
    }
}
