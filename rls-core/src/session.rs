//! Pool checkout with identity binding on acquire and clearing on release.

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Row};
use std::time::Duration;

use crate::context::{clear_sql, IdentityContext};
use crate::error::RlsError;

/// A connection checkout bound to one identity for its whole lifetime.
///
/// Acquire binds, [`release`](ScopedSession::release) clears. If a session
/// is dropped without release (early `?`, panic, request cancellation), the
/// pool's release hook installed by [`pool_options_with_reset`] still clears
/// the variables before the connection can be reused, so a stale binding
/// never survives to the next checkout either way.
pub struct ScopedSession {
    conn: PoolConnection<Postgres>,
    identity: IdentityContext,
}

impl ScopedSession {
    /// Check a connection out of the pool and bind `identity` onto it.
    pub async fn acquire(pool: &PgPool, identity: IdentityContext) -> Result<Self, RlsError> {
        let mut conn = pool.acquire().await?;
        identity.bind(&mut conn).await?;
        Ok(Self { conn, identity })
    }

    /// The underlying connection, for issuing policy-filtered queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    /// Clear the bound identity and return the connection to the pool.
    pub async fn release(mut self) -> Result<(), RlsError> {
        IdentityContext::clear(&mut self.conn).await
    }
}

/// Pool options whose release hook resets both session variables whenever a
/// connection returns to the pool.
///
/// On hook failure the connection is discarded rather than reused: a
/// connection that might still carry an identity must never reach another
/// request.
pub fn pool_options_with_reset(max_connections: u32, min_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .after_release(|conn, _meta| {
            Box::pin(async move {
                match sqlx::query(clear_sql()).execute(&mut *conn).await {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Failed to reset session variables on release; discarding connection"
                        );
                        Ok(false)
                    }
                }
            })
        })
}

/// Connect with the reset hook in place.
pub async fn connect_with_reset(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<PgPool, RlsError> {
    let pool = pool_options_with_reset(max_connections, min_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

const ROLE_PROBE_SQL: &str = "SELECT current_user::text AS name, rolsuper, rolbypassrls \
     FROM pg_roles WHERE rolname = current_user";

/// Privilege attributes of the role a connection authenticated as.
///
/// Startup validation compares this against the configured application and
/// maintenance role names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRole {
    pub name: String,
    pub is_superuser: bool,
    pub bypasses_rls: bool,
}

impl ConnectionRole {
    /// Whether installed policies can bind this role at all. Superusers and
    /// roles carrying BYPASSRLS are exempt from row security regardless of
    /// what is installed, and `FORCE ROW LEVEL SECURITY` cannot subject them
    /// either.
    pub fn is_policy_exempt(&self) -> bool {
        self.is_superuser || self.bypasses_rls
    }
}

/// Read the privilege attributes of the connection's current role.
pub async fn connection_role(conn: &mut PgConnection) -> Result<ConnectionRole, RlsError> {
    let row = sqlx::query(ROLE_PROBE_SQL).fetch_one(&mut *conn).await?;
    Ok(ConnectionRole {
        name: row.try_get("name")?,
        is_superuser: row.try_get("rolsuper")?,
        bypasses_rls: row.try_get("rolbypassrls")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superusers_and_bypassrls_roles_are_policy_exempt() {
        let plain = ConnectionRole {
            name: "app_user".to_string(),
            is_superuser: false,
            bypasses_rls: false,
        };
        assert!(!plain.is_policy_exempt());

        let superuser = ConnectionRole {
            is_superuser: true,
            ..plain.clone()
        };
        assert!(superuser.is_policy_exempt());

        let bypasser = ConnectionRole {
            bypasses_rls: true,
            ..plain
        };
        assert!(bypasser.is_policy_exempt());
    }
}
