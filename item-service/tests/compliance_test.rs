//! Registry/migrations cross-check.
//!
//! Every table declaring an `owner_id` column must be registered by
//! `register_owned_entities`, and every registered table must exist in the
//! migration SQL with an `owner_id` column. This is the CI gate standing in
//! for "impossible to forget" registration.

use item_service::models::register_owned_entities;
use rls_core::{RlsRegistry, OWNER_COLUMN};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Extract `(table, has_owner_column)` pairs from every CREATE TABLE block
/// in the migration SQL.
fn tables_in_migrations() -> Vec<(String, bool)> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut tables = Vec::new();

    let mut entries: Vec<_> = fs::read_dir(&dir)
        .expect("migrations directory")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    entries.sort();

    for path in entries {
        let sql = fs::read_to_string(&path).expect("readable migration");
        let lowered = sql.to_lowercase();
        let mut rest = lowered.as_str();
        while let Some(pos) = rest.find("create table") {
            let after = &rest[pos..];
            let header_end = after.find('(').unwrap_or(after.len());
            let name = after[..header_end]
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_string();
            let body_end = after.find(");").unwrap_or(after.len());
            let body = &after[header_end..body_end];
            tables.push((name, body.contains(OWNER_COLUMN)));
            rest = &after[body_end..];
        }
    }
    tables
}

#[test]
fn every_owner_bearing_table_is_registered() {
    let registry = RlsRegistry::new();
    register_owned_entities(&registry);

    for (table, has_owner) in tables_in_migrations() {
        if has_owner {
            assert!(
                registry.is_registered(&table),
                "table '{table}' declares an {OWNER_COLUMN} column but is not registered; \
                 add it to register_owned_entities"
            );
        }
    }
}

#[test]
fn every_registered_table_exists_with_an_owner_column() {
    let registry = RlsRegistry::new();
    register_owned_entities(&registry);

    let migration_tables: BTreeSet<String> = tables_in_migrations()
        .into_iter()
        .filter(|(_, has_owner)| *has_owner)
        .map(|(name, _)| name)
        .collect();

    for table in registry.table_names() {
        assert!(
            migration_tables.contains(&table),
            "registered table '{table}' has no migration declaring an {OWNER_COLUMN} column"
        );
    }
}

#[test]
fn the_users_table_is_not_registered() {
    let registry = RlsRegistry::new();
    register_owned_entities(&registry);
    assert!(!registry.is_registered("users"));
}
