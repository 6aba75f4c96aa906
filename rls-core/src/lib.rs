//! Row-level-security infrastructure for multi-tenant data isolation.
//!
//! PostgreSQL enforces per-row ownership once policies are installed; this
//! crate provides everything around that enforcement:
//!
//! - [`registry`]: the catalog of tables that require ownership isolation
//! - [`policy`]: pure generation of the policy DDL
//! - [`context`]: binding a request identity onto a database session, plus
//!   the admin bypass with capture-and-restore semantics
//! - [`session`]: pool checkout with bind-on-acquire / clear-on-release
//! - [`migrate`]: installing and removing policies for registered tables
//!
//! Policies read two session-local variables (`app.user_id`, `app.role`);
//! as long as each logical request owns its connection checkout and the
//! bind/clear discipline holds, the database itself guarantees one owner
//! never observes another owner's rows.

pub mod config;
pub mod context;
pub mod error;
pub mod migrate;
pub mod policy;
pub mod registry;
pub mod session;

pub use config::RlsSettings;
pub use context::{
    with_admin_context, AdminContext, AdminContextGuard, IdentityContext, RlsRole, SessionBinding,
};
pub use error::RlsError;
pub use migrate::{MigrationReport, PolicyMigrator};
pub use registry::{OwnedEntity, OwnershipMetadata, RlsRegistry, OWNER_COLUMN};
pub use session::{connection_role, ConnectionRole, ScopedSession};
