//! Identity binding for database sessions.
//!
//! Installed policies read two session-local variables, `app.user_id` and
//! `app.role`. [`IdentityContext::bind`] sets both for the current
//! connection; [`IdentityContext::clear`] resets both to the unset sentinel
//! (empty string, which the policy predicates treat as NULL). Variables are
//! scoped to the individual connection, so correctness depends on each
//! logical request owning its checkout and never interleaving two identities
//! without an intervening clear+bind.

use futures::future::BoxFuture;
use sqlx::{PgConnection, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RlsError;

/// Session variable holding the bound owner id.
pub const USER_ID_VAR: &str = "app.user_id";
/// Session variable holding the bound role.
pub const ROLE_VAR: &str = "app.role";

const BIND_SQL: &str =
    "SELECT set_config('app.user_id', $1, false), set_config('app.role', $2, false)";

/// Clearing writes empty strings rather than issuing `RESET`: resetting a
/// custom variable that was never set in the session is an error, while
/// `set_config` always succeeds, and the policies' `NULLIF(..., '')` guard
/// treats empty as unset.
const CLEAR_SQL: &str =
    "SELECT set_config('app.user_id', '', false), set_config('app.role', '', false)";

const READ_BINDING_SQL: &str = "SELECT current_setting('app.user_id', true) AS user_id, \
     current_setting('app.role', true) AS role";

/// Role bound to a session alongside the owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RlsRole {
    /// Subject to the ownership predicate on every verb.
    User,
    /// Bypasses the ownership predicate on all four verbs.
    Admin,
    /// Bypasses the ownership predicate on SELECT only; writes fall through
    /// to the ownership predicate.
    ReadOnlyAdmin,
}

impl RlsRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RlsRole::User => "user",
            RlsRole::Admin => "admin",
            RlsRole::ReadOnlyAdmin => "read_only_admin",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, RlsRole::Admin | RlsRole::ReadOnlyAdmin)
    }
}

impl fmt::Display for RlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RlsRole {
    type Err = RlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(RlsRole::User),
            "admin" => Ok(RlsRole::Admin),
            "read_only_admin" => Ok(RlsRole::ReadOnlyAdmin),
            other => Err(RlsError::InvalidRole(other.to_string())),
        }
    }
}

/// The identity a session is currently bound to, as read back from the
/// connection. Both fields are `None` on a fresh or cleared connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionBinding {
    pub user_id: Option<Uuid>,
    pub role: Option<RlsRole>,
}

impl SessionBinding {
    pub fn is_unset(&self) -> bool {
        self.user_id.is_none() && self.role.is_none()
    }
}

/// Per-request identity: the owner id and role the policies evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityContext {
    pub user_id: Uuid,
    pub role: RlsRole,
}

impl IdentityContext {
    pub fn new(user_id: Uuid, role: RlsRole) -> Self {
        Self { user_id, role }
    }

    /// Bind this identity onto the connection. Must run before any query
    /// that should be policy-filtered.
    pub async fn bind(&self, conn: &mut PgConnection) -> Result<(), RlsError> {
        sqlx::query(BIND_SQL)
            .bind(self.user_id.to_string())
            .bind(self.role.as_str())
            .execute(&mut *conn)
            .await?;
        tracing::debug!(user_id = %self.user_id, role = %self.role, "Bound session identity");
        Ok(())
    }

    /// Reset both session variables to the unset sentinel. Must run before
    /// the connection returns to its pool so the next checkout cannot
    /// observe a stale identity.
    pub async fn clear(conn: &mut PgConnection) -> Result<(), RlsError> {
        sqlx::query(CLEAR_SQL).execute(&mut *conn).await?;
        tracing::debug!("Cleared session identity");
        Ok(())
    }
}

/// SQL that resets both session variables, for callers that manage
/// execution themselves (the pool release hook).
pub(crate) fn clear_sql() -> &'static str {
    CLEAR_SQL
}

/// Read the identity currently bound to the connection.
///
/// Empty-string values (never set, or cleared) normalise to `None`. An
/// unparseable value is logged and read as `None` rather than failing the
/// caller.
pub async fn current_binding(conn: &mut PgConnection) -> Result<SessionBinding, RlsError> {
    let row = sqlx::query(READ_BINDING_SQL).fetch_one(&mut *conn).await?;
    let raw_user: Option<String> = row.try_get("user_id")?;
    let raw_role: Option<String> = row.try_get("role")?;

    let user_id = raw_user.filter(|s| !s.is_empty()).and_then(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| tracing::warn!(value = %s, error = %e, "Unparseable bound user id"))
            .ok()
    });
    let role = raw_role.filter(|s| !s.is_empty()).and_then(|s| {
        RlsRole::from_str(&s)
            .map_err(|e| tracing::warn!(value = %s, error = %e, "Unparseable bound role"))
            .ok()
    });

    Ok(SessionBinding { user_id, role })
}

/// Scoped elevation for privileged operations.
///
/// Entry captures whatever identity is currently bound, then binds the
/// admin's own; exit restores the captured identity or clears if none
/// existed. The capture/restore pair is what keeps nested privileged
/// sections from leaking an elevated identity onto a pooled connection.
#[derive(Debug, Clone, Copy)]
pub struct AdminContext {
    pub user_id: Uuid,
    pub role: RlsRole,
}

impl AdminContext {
    /// Elevation that bypasses the ownership predicate on all four verbs.
    pub fn full_admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: RlsRole::Admin,
        }
    }

    /// Elevation that bypasses the ownership predicate on SELECT only.
    pub fn read_only(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: RlsRole::ReadOnlyAdmin,
        }
    }

    /// Capture the prior binding and bind the admin identity.
    ///
    /// Failure to read the prior state is logged and swallowed; restore then
    /// degrades to a clear. Losing restoration is less dangerous than
    /// blocking a legitimate admin action. Failure to bind the admin
    /// identity itself is an error.
    pub async fn enter(&self, conn: &mut PgConnection) -> Result<AdminContextGuard, RlsError> {
        let prior = match current_binding(&mut *conn).await {
            Ok(binding) => binding,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to read prior session binding; exit will clear instead of restore"
                );
                SessionBinding::default()
            }
        };

        IdentityContext::new(self.user_id, self.role).bind(conn).await?;
        tracing::debug!(user_id = %self.user_id, role = %self.role, "Entered admin context");

        Ok(AdminContextGuard { prior })
    }
}

/// Proof of an entered admin context; holds the captured prior binding.
///
/// Callers must invoke [`exit`](AdminContextGuard::exit) on every path,
/// including failure of the wrapped operation. [`with_admin_context`] wraps
/// the enter/exit pair for closure-shaped call sites.
#[must_use = "exit() must run or the elevated identity stays bound"]
pub struct AdminContextGuard {
    prior: SessionBinding,
}

impl AdminContextGuard {
    /// Restore the captured binding, or clear if none existed.
    ///
    /// Best-effort: a failed restore is logged and a clear is attempted as
    /// the safe default; nothing propagates, because blocking teardown on a
    /// secondary failure is worse than a logged anomaly.
    pub async fn exit(self, conn: &mut PgConnection) {
        let result = match (self.prior.user_id, self.prior.role) {
            (Some(user_id), Some(role)) => {
                IdentityContext::new(user_id, role).bind(&mut *conn).await
            }
            _ => IdentityContext::clear(&mut *conn).await,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to restore prior session binding; clearing");
            if let Err(e) = IdentityContext::clear(conn).await {
                tracing::error!(error = %e, "Failed to clear session binding on admin exit");
            }
        } else {
            tracing::debug!("Exited admin context");
        }
    }
}

/// Run `op` between admin-context entry and exit, so exit runs on the error
/// path too.
pub async fn with_admin_context<'c, T, E, F>(
    admin: &AdminContext,
    conn: &'c mut PgConnection,
    op: F,
) -> Result<T, E>
where
    E: From<RlsError>,
    F: for<'a> FnOnce(&'a mut PgConnection) -> BoxFuture<'a, Result<T, E>>,
{
    let guard = admin.enter(&mut *conn).await.map_err(E::from)?;
    let result = op(&mut *conn).await;
    guard.exit(conn).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [RlsRole::User, RlsRole::Admin, RlsRole::ReadOnlyAdmin] {
            assert_eq!(RlsRole::from_str(role.as_str()).unwrap(), role);
        }
        assert!(RlsRole::from_str("superuser").is_err());
    }

    #[test]
    fn privileged_roles() {
        assert!(!RlsRole::User.is_privileged());
        assert!(RlsRole::Admin.is_privileged());
        assert!(RlsRole::ReadOnlyAdmin.is_privileged());
    }

    #[test]
    fn admin_constructors_pick_the_right_role() {
        let id = Uuid::new_v4();
        assert_eq!(AdminContext::full_admin(id).role, RlsRole::Admin);
        assert_eq!(AdminContext::read_only(id).role, RlsRole::ReadOnlyAdmin);
    }

    #[test]
    fn bind_and_clear_sql_touch_both_variables() {
        for sql in [BIND_SQL, CLEAR_SQL, READ_BINDING_SQL] {
            assert!(sql.contains(USER_ID_VAR), "{sql}");
            assert!(sql.contains(ROLE_VAR), "{sql}");
        }
    }

    #[test]
    fn fresh_binding_is_unset() {
        assert!(SessionBinding::default().is_unset());
        let bound = SessionBinding {
            user_id: Some(Uuid::new_v4()),
            role: Some(RlsRole::User),
        };
        assert!(!bound.is_unset());
    }
}
