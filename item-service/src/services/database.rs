//! Database service for item-service.

use futures::future::BoxFuture;
use rls_core::{IdentityContext, ScopedSession};
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::models::User;

/// Database connection pool wrapper.
///
/// The pool comes from `rls_core::session`, so every connection returning to
/// it has its session variables reset by the release hook regardless of how
/// the request ended.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(config), fields(service = "item-service"))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );
        let pool = rls_core::session::connect_with_reset(
            &config.url,
            config.max_connections,
            config.min_connections,
        )
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run schema migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Check a connection out and bind `identity` onto it. All queries that
    /// must be policy-filtered go through the returned session.
    pub async fn rls_session(&self, identity: IdentityContext) -> Result<ScopedSession, AppError> {
        Ok(ScopedSession::acquire(&self.pool, identity).await?)
    }

    /// Run `op` on a session bound to `identity`, releasing on every path.
    ///
    /// The operation's error takes precedence over a release failure; a
    /// dropped-without-release session is still covered by the pool hook.
    pub async fn with_session<T, F>(
        &self,
        identity: IdentityContext,
        op: F,
    ) -> Result<T, AppError>
    where
        F: for<'c> FnOnce(&'c mut sqlx::PgConnection) -> BoxFuture<'c, Result<T, AppError>>,
    {
        let mut session = self.rls_session(identity).await?;
        let result = op(session.conn()).await;
        let released = session.release().await;
        let value = result?;
        released?;
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // User operations (the users table is not policy-filtered; users are the
    // owners, not an owned entity)
    // -------------------------------------------------------------------------

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, hashed_password, full_name, is_active, is_superuser, created_utc \
             FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load user: {}", e)))?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, hashed_password, full_name, is_active, is_superuser, created_utc \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load user: {}", e)))?;
        Ok(user)
    }

    #[instrument(skip(self, hashed_password), fields(email = %email))]
    pub async fn insert_user(
        &self,
        email: &str,
        hashed_password: &str,
        full_name: Option<&str>,
        is_superuser: bool,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (user_id, email, hashed_password, full_name, is_active, is_superuser) \
             VALUES ($1, $2, $3, $4, true, $5) \
             RETURNING user_id, email, hashed_password, full_name, is_active, is_superuser, created_utc",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(full_name)
        .bind(is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("User with email '{}' already exists", email))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;
        Ok(user)
    }
}
