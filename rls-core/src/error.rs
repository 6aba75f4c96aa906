use thiserror::Error;

/// Errors surfaced by the RLS infrastructure.
#[derive(Debug, Error)]
pub enum RlsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("RLS setup failed for table '{table}': {source}")]
    Setup {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid RLS role: '{0}'")]
    InvalidRole(String),
}

/// PostgreSQL SQLSTATE for `insufficient_privilege`, raised when a statement
/// is rejected by an installed policy.
pub const POLICY_REJECTION_SQLSTATE: &str = "42501";

/// Whether a database error is a policy rejection.
///
/// Detection matches the SQLSTATE, never the message text, so translations
/// and wording changes in the server cannot break it.
pub fn is_policy_rejection(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| code == POLICY_REJECTION_SQLSTATE)
            .unwrap_or(false),
        _ => false,
    }
}
