//! Pure generation of the row-level-security DDL.
//!
//! Nothing in this module executes SQL; callers decide when statements run,
//! which keeps generation trivially testable and enables dry runs. Table
//! names come from the registry (compile-time constants on entities), never
//! from user input.
//!
//! The predicate on every policy is: the session's bound owner id equals the
//! row's `owner_id`, OR the session's bound role is privileged for the verb.
//! `admin` bypasses all four verbs; `read_only_admin` bypasses SELECT only.

use crate::registry::OWNER_COLUMN;

/// The four policies installed on every isolated table, in verb order.
pub const POLICY_NAMES: [&str; 4] = [
    "user_select_policy",
    "user_insert_policy",
    "user_update_policy",
    "user_delete_policy",
];

/// CRUD verb covered by one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerb {
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyVerb {
    pub const ALL: [PolicyVerb; 4] = [
        PolicyVerb::Select,
        PolicyVerb::Insert,
        PolicyVerb::Update,
        PolicyVerb::Delete,
    ];

    pub fn policy_name(self) -> &'static str {
        match self {
            PolicyVerb::Select => POLICY_NAMES[0],
            PolicyVerb::Insert => POLICY_NAMES[1],
            PolicyVerb::Update => POLICY_NAMES[2],
            PolicyVerb::Delete => POLICY_NAMES[3],
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            PolicyVerb::Select => "SELECT",
            PolicyVerb::Insert => "INSERT",
            PolicyVerb::Update => "UPDATE",
            PolicyVerb::Delete => "DELETE",
        }
    }

    /// Roles exempted from the ownership predicate for this verb.
    fn bypass_roles(self) -> &'static str {
        match self {
            PolicyVerb::Select => "('admin', 'read_only_admin')",
            _ => "('admin')",
        }
    }
}

/// The ownership half of every policy predicate.
///
/// `NULLIF(..., '')` maps both a never-set and a cleared variable to NULL,
/// which matches no rows, instead of raising a uuid cast error on the empty
/// string.
fn owner_predicate() -> String {
    format!("NULLIF(current_setting('app.user_id', true), '')::uuid = {OWNER_COLUMN}")
}

fn verb_predicate(verb: PolicyVerb) -> String {
    format!(
        "{} OR current_setting('app.role', true) IN {}",
        owner_predicate(),
        verb.bypass_roles()
    )
}

/// Statement enabling row security on `table`.
pub fn enable_sql(table: &str) -> String {
    format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY")
}

/// Inverse of [`enable_sql`].
pub fn disable_sql(table: &str) -> String {
    format!("ALTER TABLE {table} DISABLE ROW LEVEL SECURITY")
}

/// Statement subjecting the table owner role to the policies as well.
pub fn force_sql(table: &str) -> String {
    format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY")
}

/// Inverse of [`force_sql`].
pub fn no_force_sql(table: &str) -> String {
    format!("ALTER TABLE {table} NO FORCE ROW LEVEL SECURITY")
}

/// Idempotent removal of the four named policies. `IF EXISTS` tolerates a
/// policy that was never installed or was already dropped.
pub fn drop_policies_sql(table: &str) -> Vec<String> {
    POLICY_NAMES
        .iter()
        .map(|name| format!("DROP POLICY IF EXISTS {name} ON {table}"))
        .collect()
}

/// The four CREATE POLICY statements, one per CRUD verb.
///
/// INSERT checks the incoming row (`WITH CHECK`); UPDATE checks both the
/// existing row (`USING`) and the resulting row (`WITH CHECK`) so a
/// non-privileged session cannot reassign ownership.
pub fn user_policies_sql(table: &str) -> Vec<String> {
    PolicyVerb::ALL
        .iter()
        .map(|&verb| create_policy_sql(table, verb))
        .collect()
}

fn create_policy_sql(table: &str, verb: PolicyVerb) -> String {
    let name = verb.policy_name();
    let predicate = verb_predicate(verb);
    match verb {
        PolicyVerb::Select | PolicyVerb::Delete => format!(
            "CREATE POLICY {name} ON {table} FOR {verb} USING ({predicate})",
            verb = verb.as_sql()
        ),
        PolicyVerb::Insert => format!(
            "CREATE POLICY {name} ON {table} FOR INSERT WITH CHECK ({predicate})"
        ),
        PolicyVerb::Update => format!(
            "CREATE POLICY {name} ON {table} FOR UPDATE USING ({predicate}) WITH CHECK ({predicate})"
        ),
    }
}

/// Complete setup for one table: enable, drop stale policies, create fresh
/// ones, in that exact order. Enabling must precede creation, and a drop
/// pass must run before creation so stale policies from a prior version are
/// never left alongside fresh ones.
pub fn complete_setup_sql(table: &str) -> Vec<String> {
    let mut statements = vec![enable_sql(table)];
    statements.extend(drop_policies_sql(table));
    statements.extend(user_policies_sql(table));
    statements
}

/// Read-only probe of whether row security is active on `table`.
pub fn check_enabled_sql(table: &str) -> String {
    format!("SELECT relrowsecurity FROM pg_class WHERE relname = '{table}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_setup_is_enable_then_drops_then_creates() {
        let statements = complete_setup_sql("items");
        assert_eq!(statements.len(), 9);

        assert!(statements[0].contains("ENABLE ROW LEVEL SECURITY"));
        assert!(statements[1..5]
            .iter()
            .all(|s| s.starts_with("DROP POLICY IF EXISTS")));
        assert!(statements[5..9]
            .iter()
            .all(|s| s.starts_with("CREATE POLICY")));
    }

    #[test]
    fn setup_names_each_policy_exactly_once_per_phase() {
        let statements = complete_setup_sql("items");
        for name in POLICY_NAMES {
            let drops = statements
                .iter()
                .filter(|s| s.starts_with("DROP") && s.contains(name))
                .count();
            let creates = statements
                .iter()
                .filter(|s| s.starts_with("CREATE") && s.contains(name))
                .count();
            assert_eq!(drops, 1, "{name} dropped once");
            assert_eq!(creates, 1, "{name} created once");
        }
    }

    #[test]
    fn verb_to_policy_name_mapping() {
        assert_eq!(PolicyVerb::Select.policy_name(), "user_select_policy");
        assert_eq!(PolicyVerb::Insert.policy_name(), "user_insert_policy");
        assert_eq!(PolicyVerb::Update.policy_name(), "user_update_policy");
        assert_eq!(PolicyVerb::Delete.policy_name(), "user_delete_policy");
    }

    #[test]
    fn read_only_admin_bypasses_select_only() {
        let policies = user_policies_sql("items");
        assert!(policies[0].contains("read_only_admin"));
        for policy in &policies[1..] {
            assert!(!policy.contains("read_only_admin"), "{policy}");
            assert!(policy.contains("'admin'"));
        }
    }

    #[test]
    fn owner_comparison_tolerates_unset_binding() {
        for policy in user_policies_sql("items") {
            assert!(policy.contains("NULLIF(current_setting('app.user_id', true), '')::uuid"));
            assert!(policy.contains("= owner_id"));
        }
    }

    #[test]
    fn update_policy_checks_resulting_row() {
        let update = &user_policies_sql("items")[2];
        assert!(update.contains("USING ("));
        assert!(update.contains("WITH CHECK ("));
    }

    #[test]
    fn insert_policy_is_with_check_only() {
        let insert = &user_policies_sql("items")[1];
        assert!(insert.contains("WITH CHECK ("));
        assert!(!insert.contains("USING ("));
    }

    #[test]
    fn enable_disable_force_shapes() {
        assert_eq!(
            enable_sql("items"),
            "ALTER TABLE items ENABLE ROW LEVEL SECURITY"
        );
        assert_eq!(
            disable_sql("items"),
            "ALTER TABLE items DISABLE ROW LEVEL SECURITY"
        );
        assert_eq!(
            force_sql("items"),
            "ALTER TABLE items FORCE ROW LEVEL SECURITY"
        );
        assert_eq!(
            no_force_sql("items"),
            "ALTER TABLE items NO FORCE ROW LEVEL SECURITY"
        );
    }

    #[test]
    fn check_enabled_probe_targets_pg_class() {
        let probe = check_enabled_sql("items");
        assert!(probe.contains("relrowsecurity"));
        assert!(probe.contains("'items'"));
    }
}
