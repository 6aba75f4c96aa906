//! RLS configuration surface.

use std::env;

/// Settings consumed by the policy migrator.
#[derive(Debug, Clone)]
pub struct RlsSettings {
    /// Global kill-switch. When false, policy creation and enablement are
    /// logged no-ops; nothing is installed and nothing is enforced.
    pub enabled: bool,
    /// When true, tables additionally get `FORCE ROW LEVEL SECURITY` so the
    /// table owner role is subject to policies too.
    pub force: bool,
    /// Database role the application connects as.
    pub app_user: String,
    /// Database role used for maintenance outside the per-row policies.
    pub maintenance_admin: String,
}

impl RlsSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("RLS_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            force: env::var("RLS_FORCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            app_user: env::var("RLS_APP_USER").unwrap_or_else(|_| "app_user".to_string()),
            maintenance_admin: env::var("RLS_MAINTENANCE_ADMIN")
                .unwrap_or_else(|_| "maintenance_admin".to_string()),
        }
    }
}

impl Default for RlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            force: false,
            app_user: "app_user".to_string(),
            maintenance_admin: "maintenance_admin".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_rls_without_force() {
        let settings = RlsSettings::default();
        assert!(settings.enabled);
        assert!(!settings.force);
    }
}
