//! Applying generated policies to the database for every registered table.

use sqlx::{PgConnection, Row};

use crate::config::RlsSettings;
use crate::error::RlsError;
use crate::policy;
use crate::registry::RlsRegistry;

/// Outcome of a bulk policy operation. Per-table failures do not abort the
/// remaining tables, but every failure is carried here so callers can
/// surface them instead of losing them in a log stream.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: bool,
}

impl MigrationReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Installs and removes row-security policies for registered tables.
///
/// Statement generation lives in [`policy`]; this type owns execution,
/// gating on the global kill-switch, and the per-table state machine:
/// absent → enable → create → enforced, and back down via drop → disable.
/// Re-entering create from the enforced state is defined (drop + recreate)
/// and idempotent.
pub struct PolicyMigrator<'a> {
    registry: &'a RlsRegistry,
    settings: &'a RlsSettings,
}

impl<'a> PolicyMigrator<'a> {
    pub fn new(registry: &'a RlsRegistry, settings: &'a RlsSettings) -> Self {
        Self { registry, settings }
    }

    /// Full setup statements for one table: enable, force when configured,
    /// drop stale policies, create fresh ones.
    pub fn setup_statements(&self, table: &str) -> Vec<String> {
        let mut statements = policy::complete_setup_sql(table);
        if self.settings.force {
            statements.insert(1, policy::force_sql(table));
        }
        statements
    }

    /// Full teardown statements: drop policies, lift force when configured,
    /// disable row security.
    pub fn teardown_statements(&self, table: &str) -> Vec<String> {
        let mut statements = policy::drop_policies_sql(table);
        if self.settings.force {
            statements.push(policy::no_force_sql(table));
        }
        statements.push(policy::disable_sql(table));
        statements
    }

    /// Enable row security and install the four policies on one table.
    /// Logged no-op when RLS is globally disabled.
    pub async fn create_for_table(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<(), RlsError> {
        if !self.settings.enabled {
            tracing::info!(table = %table, "RLS disabled, skipping policy creation");
            return Ok(());
        }

        self.execute_all(conn, table, &self.setup_statements(table))
            .await?;
        tracing::info!(table = %table, "Created RLS policies");
        Ok(())
    }

    /// Drop the four policies from one table. Not gated on the kill-switch:
    /// dropping is idempotent and safe regardless of configuration.
    pub async fn drop_for_table(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<(), RlsError> {
        self.execute_all(conn, table, &policy::drop_policies_sql(table))
            .await?;
        tracing::info!(table = %table, "Dropped RLS policies");
        Ok(())
    }

    /// Drop the four policies and disable row security on one table,
    /// executing exactly [`teardown_statements`](Self::teardown_statements).
    pub async fn teardown_for_table(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<(), RlsError> {
        self.execute_all(conn, table, &self.teardown_statements(table))
            .await?;
        tracing::info!(table = %table, "Dropped RLS policies and disabled row level security");
        Ok(())
    }

    /// Install policies on every registered table. One malformed table must
    /// not block isolation for the others, so failures are recorded and the
    /// loop continues.
    pub async fn create_all_registered(&self, conn: &mut PgConnection) -> MigrationReport {
        let mut report = MigrationReport::default();
        for table in self.registry.table_names() {
            match self.create_for_table(conn, &table).await {
                Ok(()) => report.applied.push(table),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Failed to create RLS policies");
                    report.failed.push((table, e.to_string()));
                }
            }
        }
        report
    }

    /// Drop policies from every registered table.
    pub async fn drop_all_registered(&self, conn: &mut PgConnection) -> MigrationReport {
        let mut report = MigrationReport::default();
        for table in self.registry.table_names() {
            match self.drop_for_table(conn, &table).await {
                Ok(()) => report.applied.push(table),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Failed to drop RLS policies");
                    report.failed.push((table, e.to_string()));
                }
            }
        }
        report
    }

    /// Refresh policies for every registered table: always drop and rebuild
    /// from current generator output rather than diffing against what is
    /// installed.
    pub async fn upgrade(&self, conn: &mut PgConnection) -> MigrationReport {
        if !self.settings.enabled {
            tracing::info!("RLS disabled, skipping policy upgrade");
            return MigrationReport::skipped();
        }

        if self.registry.is_empty() {
            tracing::info!("No RLS tables registered, nothing to upgrade");
            return MigrationReport::default();
        }

        let mut report = MigrationReport::default();
        for table in self.registry.table_names() {
            let result = async {
                self.drop_for_table(&mut *conn, &table).await?;
                self.create_for_table(&mut *conn, &table).await
            }
            .await;
            match result {
                Ok(()) => report.applied.push(table),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Failed to upgrade RLS policies");
                    report.failed.push((table, e.to_string()));
                }
            }
        }
        tracing::info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            "RLS policy upgrade complete"
        );
        report
    }

    /// Remove policies and disable row security for every registered table.
    pub async fn downgrade(&self, conn: &mut PgConnection) -> MigrationReport {
        if !self.settings.enabled {
            tracing::info!("RLS disabled, skipping policy downgrade");
            return MigrationReport::skipped();
        }

        let mut report = MigrationReport::default();
        for table in self.registry.table_names() {
            match self.teardown_for_table(&mut *conn, &table).await {
                Ok(()) => report.applied.push(table),
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Failed to downgrade RLS policies");
                    report.failed.push((table, e.to_string()));
                }
            }
        }
        report
    }

    /// Whether row security is currently active on `table`. Probe errors
    /// are logged and read as false.
    pub async fn check_enabled(&self, conn: &mut PgConnection, table: &str) -> bool {
        let probe = policy::check_enabled_sql(table);
        match sqlx::query(&probe).fetch_optional(&mut *conn).await {
            Ok(Some(row)) => row.try_get::<bool, _>(0).unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Failed to check RLS status");
                false
            }
        }
    }

    async fn execute_all(
        &self,
        conn: &mut PgConnection,
        table: &str,
        statements: &[String],
    ) -> Result<(), RlsError> {
        for statement in statements {
            // DDL goes through the simple query protocol; ALTER TABLE and
            // CREATE POLICY cannot be prepared.
            sqlx::raw_sql(statement)
                .execute(&mut *conn)
                .await
                .map_err(|source| RlsError::Setup {
                    table: table.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
