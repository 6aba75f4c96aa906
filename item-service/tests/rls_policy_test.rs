//! Policy installation, idempotence, probe, and downgrade tests.
//!
//! Run with: TEST_DATABASE_URL=... cargo test -- --ignored --test-threads=1

mod common;

use common::spawn_app;
use item_service::models::register_owned_entities;
use rls_core::policy::POLICY_NAMES;
use rls_core::{PolicyMigrator, RlsRegistry, RlsSettings};

fn test_registry() -> RlsRegistry {
    let registry = RlsRegistry::new();
    register_owned_entities(&registry);
    registry
}

fn test_settings() -> RlsSettings {
    RlsSettings {
        enabled: true,
        force: true,
        ..RlsSettings::default()
    }
}

async fn installed_policies(pool: &sqlx::PgPool, table: &str) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT policyname FROM pg_policies WHERE tablename = $1 ORDER BY policyname",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore] // Requires database
async fn startup_installs_the_four_policies_and_enables_row_security() {
    let app = spawn_app().await;
    let registry = test_registry();
    let settings = test_settings();
    let migrator = PolicyMigrator::new(&registry, &settings);

    let mut conn = app.pool.acquire().await.unwrap();
    assert!(migrator.check_enabled(&mut conn, "items").await);

    let mut policies = installed_policies(&app.pool, "items").await;
    policies.sort();
    let mut expected: Vec<String> = POLICY_NAMES.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(policies, expected);
}

#[tokio::test]
#[ignore]
async fn reinstalling_policies_is_idempotent() {
    let app = spawn_app().await;
    let registry = test_registry();
    let settings = test_settings();
    let migrator = PolicyMigrator::new(&registry, &settings);

    let mut conn = app.pool.acquire().await.unwrap();
    // Startup already installed once; two more rounds must not error or
    // duplicate.
    let report = migrator.upgrade(&mut conn).await;
    assert!(report.is_success(), "first refresh: {:?}", report.failed);
    let report = migrator.upgrade(&mut conn).await;
    assert!(report.is_success(), "second refresh: {:?}", report.failed);

    let policies = installed_policies(&app.pool, "items").await;
    assert_eq!(policies.len(), POLICY_NAMES.len());
}

#[tokio::test]
#[ignore]
async fn downgrade_removes_policies_and_disables_row_security() {
    let app = spawn_app().await;
    let registry = test_registry();
    let settings = test_settings();
    let migrator = PolicyMigrator::new(&registry, &settings);

    let mut conn = app.pool.acquire().await.unwrap();

    let report = migrator.downgrade(&mut conn).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert!(!migrator.check_enabled(&mut conn, "items").await);
    assert!(installed_policies(&app.pool, "items").await.is_empty());

    // Restore for other tests.
    let report = migrator.upgrade(&mut conn).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert!(migrator.check_enabled(&mut conn, "items").await);
}

#[tokio::test]
#[ignore]
async fn disabled_settings_turn_policy_creation_into_a_no_op() {
    let app = spawn_app().await;
    let registry = test_registry();

    let enabled = test_settings();
    let enabled_migrator = PolicyMigrator::new(&registry, &enabled);
    let disabled = RlsSettings {
        enabled: false,
        force: true,
        ..RlsSettings::default()
    };
    let disabled_migrator = PolicyMigrator::new(&registry, &disabled);

    let mut conn = app.pool.acquire().await.unwrap();

    // Start from a bare table.
    let report = enabled_migrator.drop_all_registered(&mut conn).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert!(installed_policies(&app.pool, "items").await.is_empty());

    // With the switch off, neither per-table creation nor the bulk upgrade
    // installs anything.
    disabled_migrator
        .create_for_table(&mut conn, "items")
        .await
        .unwrap();
    assert!(installed_policies(&app.pool, "items").await.is_empty());

    let report = disabled_migrator.upgrade(&mut conn).await;
    assert!(report.skipped);
    assert!(report.applied.is_empty());
    assert!(installed_policies(&app.pool, "items").await.is_empty());

    let report = disabled_migrator.downgrade(&mut conn).await;
    assert!(report.skipped);

    // Restore for other tests.
    let report = enabled_migrator.create_all_registered(&mut conn).await;
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(
        installed_policies(&app.pool, "items").await.len(),
        POLICY_NAMES.len()
    );
}

#[tokio::test]
#[ignore]
async fn bulk_create_and_drop_cover_every_registered_table() {
    let app = spawn_app().await;
    let registry = test_registry();
    let settings = test_settings();
    let migrator = PolicyMigrator::new(&registry, &settings);

    let mut conn = app.pool.acquire().await.unwrap();

    let report = migrator.drop_all_registered(&mut conn).await;
    assert!(report.is_success());
    assert_eq!(report.applied, registry.table_names());
    assert!(installed_policies(&app.pool, "items").await.is_empty());

    let report = migrator.create_all_registered(&mut conn).await;
    assert!(report.is_success());
    assert_eq!(report.applied, registry.table_names());
    assert_eq!(
        installed_policies(&app.pool, "items").await.len(),
        POLICY_NAMES.len()
    );
}
