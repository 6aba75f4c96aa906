//! Application startup and lifecycle management.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use backoff::ExponentialBackoff;
use rls_core::{connection_role, PolicyMigrator, RlsRegistry};
use secrecy::ExposeSecret;
use sqlx::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::handlers;
use crate::middleware::{auth_middleware, superuser_middleware};
use crate::models::register_owned_entities;
use crate::services::{Database, JwtService};
use crate::utils::password::hash_password;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub jwt: JwtService,
    pub registry: Arc<RlsRegistry>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration: wait for the
    /// database, run schema migrations, register owned entities, install
    /// row-security policies, validate, seed, and bind the listener.
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build without running schema migrations. Use in tests when the
    /// harness already applied them.
    pub async fn build_without_migrations(config: AppConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: AppConfig, run_migrations: bool) -> Result<Self, AppError> {
        wait_for_database(&config.database.url).await?;

        let db = Database::new(&config.database).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let registry = Arc::new(RlsRegistry::new());
        register_owned_entities(&registry);

        install_rls_policies(&db, &registry, &config).await?;
        validate_rls_configuration(&db, &registry, &config).await?;
        seed_first_users(&db, &config).await?;

        let db = Arc::new(db);
        let state = AppState {
            config: config.clone(),
            db,
            jwt: JwtService::new(&config.jwt),
            registry,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to bind: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to read addr: {}", e)))?
            .port();

        let router = build_router(state, &config);

        tracing::info!(port = port, "Application built");
        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(port = self.port, "Starting HTTP server");
        axum::serve(self.listener, self.router).await
    }
}

fn build_router(state: AppState, config: &AppConfig) -> Router {
    let admin_routes = Router::new()
        .route("/items/admin/all", get(handlers::admin_items::list_all_items))
        .route(
            "/items/admin/:id",
            put(handlers::admin_items::update_any_item)
                .delete(handlers::admin_items::delete_any_item),
        )
        .route("/users", post(handlers::users::create_user))
        .route_layer(middleware::from_fn(superuser_middleware));

    let protected_routes = Router::new()
        .route(
            "/items",
            get(handlers::items::list_items).post(handlers::items::create_item),
        )
        .route(
            "/items/:id",
            get(handlers::items::read_item)
                .put(handlers::items::update_item)
                .delete(handlers::items::delete_item),
        )
        .route("/users/me", get(handlers::users::read_user_me))
        .route("/login/test-token", post(handlers::auth::test_token))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/login/access-token", post(handlers::auth::login_access_token))
        .merge(protected_routes);

    let mut router = Router::new()
        .route("/health", get(handlers::app::health_check))
        .route("/ready", get(handlers::app::readiness_check))
        .nest("/api/v1", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    if !config.allowed_origins.is_empty() {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
            .collect();
        router = router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );
    }

    router
}

/// Wait for the database with exponential backoff before touching it.
async fn wait_for_database(database_url: &str) -> Result<(), AppError> {
    let policy = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, || async {
        match sqlx::PgConnection::connect(database_url).await {
            Ok(conn) => {
                conn.close().await.ok();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Database not ready, retrying");
                Err(backoff::Error::transient(e))
            }
        }
    })
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Database never became ready: {}", e)))
}

/// Refresh policies for every registered table. Any per-table failure fails
/// the build: a registered table left without policies would serve requests
/// unisolated.
async fn install_rls_policies(
    db: &Database,
    registry: &RlsRegistry,
    config: &AppConfig,
) -> Result<(), AppError> {
    let migrator = PolicyMigrator::new(registry, &config.rls);
    let mut conn = db.pool().acquire().await.map_err(acquire_err)?;

    let report = migrator.upgrade(&mut conn).await;
    if !report.is_success() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "RLS policy upgrade failed for {} table(s): {:?}",
            report.failed.len(),
            report.failed
        )));
    }
    Ok(())
}

// sqlx::Error -> AppError through the RLS taxonomy.
fn acquire_err(e: sqlx::Error) -> AppError {
    AppError::from(rls_core::RlsError::from(e))
}

/// Log the registry contents and warn about suspicious configurations: RLS
/// enabled with an empty registry, a registered table whose row security
/// reports disabled, or a connected role the policies cannot bind.
async fn validate_rls_configuration(
    db: &Database,
    registry: &RlsRegistry,
    config: &AppConfig,
) -> Result<(), AppError> {
    if !config.rls.enabled {
        tracing::warn!("RLS is globally disabled; owned tables are NOT isolated");
        return Ok(());
    }

    let mut conn = db.pool().acquire().await.map_err(acquire_err)?;

    let role = connection_role(&mut conn).await?;
    if role.is_policy_exempt() {
        tracing::warn!(
            role = %role.name,
            is_superuser = role.is_superuser,
            bypasses_rls = role.bypasses_rls,
            "Connected role is exempt from row security; owned tables are NOT isolated"
        );
    }
    if role.name == config.rls.maintenance_admin {
        tracing::warn!(
            role = %role.name,
            "Connected as the maintenance role; the service must run as the application role"
        );
    } else if role.name != config.rls.app_user {
        tracing::warn!(
            role = %role.name,
            expected = %config.rls.app_user,
            "Connected role does not match the configured application role"
        );
    }

    tracing::info!(
        tables = ?registry.table_names(),
        entities = ?registry.entity_names(),
        "RLS registry contents"
    );

    if registry.is_empty() {
        tracing::warn!("RLS is enabled but no owned entities are registered");
        return Ok(());
    }

    let migrator = PolicyMigrator::new(registry, &config.rls);
    for table in registry.table_names() {
        if !migrator.check_enabled(&mut conn, &table).await {
            tracing::warn!(table = %table, "Registered table reports row security disabled");
        }
    }
    Ok(())
}

/// Create the first superuser and first regular user when configured and
/// not present yet.
async fn seed_first_users(db: &Database, config: &AppConfig) -> Result<(), AppError> {
    let seeds = [
        (
            config.seed.first_superuser.as_ref(),
            config.seed.first_superuser_password.as_ref(),
            true,
        ),
        (
            config.seed.first_user.as_ref(),
            config.seed.first_user_password.as_ref(),
            false,
        ),
    ];

    for (email, password, is_superuser) in seeds {
        let (Some(email), Some(password)) = (email, password) else {
            continue;
        };
        if db.get_user_by_email(email).await?.is_some() {
            continue;
        }
        let hashed = hash_password(password.expose_secret())?;
        let user = db.insert_user(email, &hashed, None, is_superuser).await?;
        tracing::info!(user_id = %user.user_id, is_superuser = is_superuser, "Seeded user");
    }
    Ok(())
}
