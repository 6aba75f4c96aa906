//! Catalog of tables that require row-ownership isolation.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Name of the owner-reference column on every isolated table.
///
/// The generated policies compare this column against the session's bound
/// identity, so it is fixed rather than configurable per table.
pub const OWNER_COLUMN: &str = "owner_id";

/// Marker for record types that require row-level isolation.
///
/// Implementors must carry a non-nullable [`OWNER_COLUMN`] column with a
/// cascading foreign key to the users table and an index. Implementing the
/// trait does not register the type by itself; a startup routine enumerates
/// every implementor and registers it explicitly, and the migrations/registry
/// compliance test keeps that list honest.
pub trait OwnedEntity {
    /// Database table backing this entity.
    const TABLE_NAME: &'static str;
    /// Human-readable entity name, used in diagnostics.
    const ENTITY_NAME: &'static str;
}

/// Ownership metadata for one registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMetadata {
    pub table_name: String,
    pub entity_name: String,
    pub owner_column: String,
    pub registered_utc: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    tables: BTreeMap<String, OwnershipMetadata>,
    entities: Vec<String>,
}

/// Catalog mapping table names to ownership metadata.
///
/// One instance is constructed at startup, populated by the entity
/// registration routine, and then read by the policy migrator and startup
/// validation. Request-handling code never mutates it.
#[derive(Debug, Default)]
pub struct RlsRegistry {
    inner: RwLock<RegistryInner>,
}

impl RlsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owned entity type.
    pub fn register<E: OwnedEntity>(&self) {
        self.register_table(OwnershipMetadata {
            table_name: E::TABLE_NAME.to_string(),
            entity_name: E::ENTITY_NAME.to_string(),
            owner_column: OWNER_COLUMN.to_string(),
            registered_utc: Utc::now(),
        });
    }

    /// Idempotent upsert keyed by table name. Re-registration overwrites the
    /// existing metadata instead of duplicating it.
    pub fn register_table(&self, metadata: OwnershipMetadata) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        tracing::debug!(
            table = %metadata.table_name,
            entity = %metadata.entity_name,
            "Registered RLS table"
        );
        if !inner.entities.contains(&metadata.entity_name) {
            inner.entities.push(metadata.entity_name.clone());
        }
        inner.tables.insert(metadata.table_name.clone(), metadata);
    }

    /// All registered tables, as a defensive copy. Mutating the returned map
    /// does not affect the registry.
    pub fn registered_tables(&self) -> BTreeMap<String, OwnershipMetadata> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .tables
            .clone()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .tables
            .keys()
            .cloned()
            .collect()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entities
            .clone()
    }

    pub fn is_registered(&self, table_name: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .tables
            .contains_key(table_name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wipe all registrations. For test harnesses only; production code must
    /// never call this.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.tables.clear();
        inner.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    impl OwnedEntity for Widget {
        const TABLE_NAME: &'static str = "widgets";
        const ENTITY_NAME: &'static str = "Widget";
    }

    #[test]
    fn register_records_table_and_entity() {
        let registry = RlsRegistry::new();
        registry.register::<Widget>();

        assert!(registry.is_registered("widgets"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entity_names(), vec!["Widget".to_string()]);

        let meta = &registry.registered_tables()["widgets"];
        assert_eq!(meta.owner_column, OWNER_COLUMN);
        assert_eq!(meta.entity_name, "Widget");
    }

    #[test]
    fn re_registration_overwrites_instead_of_duplicating() {
        let registry = RlsRegistry::new();
        registry.register::<Widget>();
        registry.register::<Widget>();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entity_names().len(), 1);
    }

    #[test]
    fn registered_tables_returns_a_defensive_copy() {
        let registry = RlsRegistry::new();
        registry.register::<Widget>();

        let mut copy = registry.registered_tables();
        copy.clear();

        assert!(registry.is_registered("widgets"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_wipes_all_registrations() {
        let registry = RlsRegistry::new();
        registry.register::<Widget>();
        registry.clear();

        assert!(registry.is_empty());
        assert!(!registry.is_registered("widgets"));
        assert!(registry.entity_names().is_empty());
    }
}
