//! Common test utilities for item-service integration tests.
//!
//! Database-backed tests read `TEST_DATABASE_URL`. The role it points at
//! must NOT be a PostgreSQL superuser: the test configuration turns on
//! `RLS_FORCE`, so the table-owner role is subject to policies, but nothing
//! can subject a cluster superuser to them.

use item_service::config::{AppConfig, DatabaseConfig, JwtConfig, SeedConfig, ServerConfig};
use item_service::startup::Application;
use rls_core::RlsSettings;
use secrecy::Secret;
use serde_json::Value;
use sqlx::postgres::PgPool;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,item_service=debug,rls_core=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run database-backed tests")
}

pub const SUPERUSER_PASSWORD: &str = "test-superuser-password";

fn test_config(superuser_email: &str, rls: RlsSettings) -> AppConfig {
    AppConfig {
        service_name: "item-service-test".to_string(),
        server: ServerConfig { port: 0 },
        database: DatabaseConfig {
            url: database_url(),
            max_connections: 4,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: Secret::new("integration-test-secret-0123456789ab".to_string()),
            access_token_expire_minutes: 60,
        },
        rls,
        seed: SeedConfig {
            first_superuser: Some(superuser_email.to_string()),
            first_superuser_password: Some(Secret::new(SUPERUSER_PASSWORD.to_string())),
            first_user: None,
            first_user_password: None,
        },
        allowed_origins: Vec::new(),
        log_level: "debug".to_string(),
        log_json: false,
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub superuser_email: String,
    pub pool: PgPool,
}

/// Spawn a test application with a per-run unique superuser.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_rls(RlsSettings {
        enabled: true,
        force: true,
        ..RlsSettings::default()
    })
    .await
}

/// Spawn with explicit RLS settings, for tests exercising the kill-switch.
#[allow(dead_code)]
pub async fn spawn_app_with_rls(rls: RlsSettings) -> TestApp {
    init_tracing();

    let superuser_email = format!("admin-{}@example.com", Uuid::new_v4());
    let config = test_config(&superuser_email, rls);

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let pool = PgPool::connect(&database_url())
        .await
        .expect("Failed to connect test pool");

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        client: reqwest::Client::new(),
        superuser_email,
        pool,
    }
}

#[allow(dead_code)]
impl TestApp {
    /// Log in and return the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(format!("{}/api/v1/login/access-token", self.address))
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(response.status(), 200, "login should succeed for {email}");
        let body: Value = response.json().await.expect("Token body");
        body["access_token"].as_str().expect("access_token").to_string()
    }

    pub async fn superuser_token(&self) -> String {
        self.login(&self.superuser_email, SUPERUSER_PASSWORD).await
    }

    /// Create a regular user through the admin API and return
    /// `(user_id, email, password)`.
    pub async fn create_user(&self, superuser_token: &str) -> (Uuid, String, String) {
        let email = format!("user-{}@example.com", Uuid::new_v4());
        let password = "regular-user-password".to_string();
        let response = self
            .client
            .post(format!("{}/api/v1/users", self.address))
            .bearer_auth(superuser_token)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Create user request failed");
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.expect("User body");
        let user_id = body["user_id"].as_str().expect("user_id").parse().unwrap();
        (user_id, email, password)
    }

    /// Create an item as the token's user and return its id.
    pub async fn create_item(&self, token: &str, title: &str) -> Uuid {
        let response = self
            .client
            .post(format!("{}/api/v1/items", self.address))
            .bearer_auth(token)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .expect("Create item request failed");
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("Item body");
        body["item_id"].as_str().expect("item_id").parse().unwrap()
    }

    /// List item ids visible to the token's user.
    pub async fn list_item_ids(&self, token: &str, path: &str) -> Vec<Uuid> {
        let response = self
            .client
            .get(format!("{}{}?limit=500", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("List request failed");
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.expect("List body");
        body["data"]
            .as_array()
            .expect("data array")
            .iter()
            .map(|item| item["item_id"].as_str().unwrap().parse().unwrap())
            .collect()
    }
}
