//! # food-order-api: food delivery ordering service
//!
//! `food_order_api` is the backend of a food delivery service. Customers register, browse the
//! product catalogue kept by administrators, place orders and track them until a delivery agent
//! hands them over against a one-time password. Administrators manage users and products and
//! assign delivery agents to orders.
//!
//! ## Architecture
//!
//! The service runs as two processes built from this crate:
//!
//! - **API** (`food-order-api serve`, the default): an [Axum](https://github.com/tokio-rs/axum)
//!   HTTP server exposing the REST API under `/api` and interactive documentation at `/doc/`.
//! - **Worker** (`food-order-api worker`): waits for the shared application directory, then
//!   consumes background tasks (notification emails and bulk product imports). See
//!   [`entrypoint`].
//!
//! Slow work never runs inside a request. Handlers enqueue a task with
//! [`TaskQueue::delay`](tasks::TaskQueue::delay) and return; the worker picks it up from
//! storage. When the in-memory backend is configured there is nothing to share between
//! processes, so the worker runs inside the API process instead.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) holds the handlers and the request/response models. Payloads
//! deserialize into typed request structs, which are then validated field by field so that
//! clients get every problem back at once.
//!
//! The **authentication layer** ([`auth`]) issues and verifies JWT access/refresh pairs,
//! hashes passwords with Argon2 and provides the permission extractors handlers use to state
//! who may call them.
//!
//! The **database layer** ([`db`]) defines the [`Storage`](db::storage::Storage) trait with an
//! in-memory backend for development and tests and a PostgreSQL backend for production.
//!
//! The **task layer** ([`tasks`]) is the queue, the worker loop and the task implementations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use food_order_api::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = food_order_api::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     food_order_api::telemetry::init_telemetry(&config.log_level)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod entrypoint;
pub mod errors;
mod notifications;
mod openapi;
pub mod tasks;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{self, HeaderValue, Method, StatusCode},
    response::Redirect,
    routing::{get, post},
};
use bon::Builder;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    auth::password,
    config::{CorsOrigin, DatabaseConfig},
    db::{
        models::users::{UserCreateDBRequest, UserType, UserUpdateDBRequest},
        storage::Storage,
    },
    openapi::ApiDoc,
    tasks::{TaskQueue, worker::Worker},
    types::abbrev,
};
pub use config::Config;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .storage(storage.clone())
///     .config(config)
///     .tasks(TaskQueue::new(storage))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub config: Config,
    /// Producer side of the background task queue
    pub tasks: TaskQueue,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the configured admin account, or bring an existing one back to a known state.
///
/// Does nothing unless `admin_password` is set. An existing account with the admin username
/// gets the configured password, the admin role and is reactivated.
#[instrument(skip_all, fields(username = %config.admin_username))]
pub async fn create_initial_admin_user(config: &Config, storage: &dyn Storage) -> anyhow::Result<Option<types::UserId>> {
    let Some(admin_password) = config.admin_password.as_deref() else {
        debug!("No admin_password configured, skipping initial admin user");
        return Ok(None);
    };

    let params = config.auth.password.argon2_params();
    let plain = admin_password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain, params)).await??;

    if let Some(existing) = storage.get_user_by_username(&config.admin_username).await? {
        storage
            .update_user(
                &existing.id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    user_type: Some(UserType::Admin),
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = abbrev(&existing.id), "Refreshed initial admin user");
        return Ok(Some(existing.id));
    }

    let created = storage
        .create_user(&UserCreateDBRequest {
            username: config.admin_username.clone(),
            email: auth::normalize_email(&config.admin_email),
            phone: None,
            user_type: UserType::Admin,
            password_hash,
        })
        .await?;
    info!(user_id = abbrev(&created.id), "Created initial admin user");
    Ok(Some(created.id))
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;
    let allow_origin = if cors_config.allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash a parsed URL gets
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

async fn page_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Page not found." })))
}

/// Build the main application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{auth, orders, products, tasks, users};

    let api_routes = Router::new()
        // Authentication and registration
        .route("/users/login/", post(auth::login))
        .route("/users/refresh/", post(auth::refresh))
        .route("/user/", post(users::register))
        // Users
        .route("/users/", get(users::list_users))
        .route(
            "/users/{id}/",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        // Products
        .route("/products/", get(products::list_products).post(products::create_products))
        .route(
            "/products/{id}/",
            get(products::get_product)
                .put(products::update_product)
                .patch(products::patch_product)
                .delete(products::delete_product),
        )
        // Orders
        .route("/orders/", get(orders::list_orders).post(orders::create_order))
        .route("/orders/{id}/", get(orders::get_order).patch(orders::update_order))
        .route("/orders/{id}/verify-otp/", post(orders::verify_otp))
        // Background tasks
        .route("/orders/bulk_create/", post(tasks::bulk_create))
        .route("/orders/check_progress/{task_id}/", get(tasks::check_progress))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/doc", get(|| async { Redirect::permanent("/doc/") }))
        .merge(Scalar::with_url("/doc/", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .fallback(page_not_found);

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// Holds the embedded task worker when one runs inside the API process. When dropped, the
/// `drop_guard` cancels the shutdown token, signalling the worker to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the embedded worker when configured, or always for in-memory storage.
fn setup_background_services(
    config: &Config,
    storage: Arc<dyn Storage>,
    tasks: &TaskQueue,
    shutdown_token: CancellationToken,
) -> anyhow::Result<BackgroundServices> {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let embedded = config.worker.embedded || config.database == DatabaseConfig::Memory;
    if embedded {
        let worker = Worker::new(config, storage, tasks)?;
        info!(worker_id = worker.id(), "Starting embedded task worker");
        background_tasks.push(tokio::spawn(worker.run(shutdown_token.clone())));
    } else {
        info!("Embedded task worker disabled, tasks are left to the standalone worker");
    }

    Ok(BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    })
}

/// Main application struct that owns all resources and manages the application lifecycle.
///
/// 1. **Create**: [`Application::new`] connects storage, runs migrations, creates the initial
///    admin user and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops all services
pub struct Application {
    router: Router,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting food order API with configuration: {:#?}", config);

        let storage = db::connect(&config.database).await?;
        Self::new_with_storage(config, storage).await
    }

    /// Create an application on top of an already opened storage backend
    pub async fn new_with_storage(config: Config, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        create_initial_admin_user(&config, storage.as_ref()).await?;

        let tasks = TaskQueue::new(storage.clone());
        let bg_services = setup_background_services(&config, storage.clone(), &tasks, CancellationToken::new())?;

        let app_state = AppState::builder()
            .storage(storage)
            .config(config.clone())
            .tasks(tasks)
            .build();
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Food order API listening on http://{}, docs at http://localhost:{}/doc/",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;
        if self.config.database == DatabaseConfig::Memory {
            warn!("In-memory storage discarded on shutdown");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::storage::in_memory::InMemoryStorage;
    use crate::test_utils::*;
    use axum::http::StatusCode;

    #[test_log::test(tokio::test)]
    async fn test_create_initial_admin_user_new_user() {
        let mut config = create_test_config();
        config.admin_password = Some("admin-password".to_string());
        let storage = InMemoryStorage::new();

        let id = create_initial_admin_user(&config, &storage).await.unwrap().unwrap();
        let admin = storage.get_user(&id).await.unwrap().unwrap();
        assert_eq!(admin.username, "admin");
        assert_eq!(admin.user_type, UserType::Admin);
        assert!(password::verify_password("admin-password", &admin.password_hash).unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_create_initial_admin_user_existing_user() {
        let mut config = create_test_config();
        config.admin_password = Some("first-password".to_string());
        let storage = InMemoryStorage::new();
        let first = create_initial_admin_user(&config, &storage).await.unwrap().unwrap();

        storage
            .update_user(
                &first,
                &UserUpdateDBRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        config.admin_password = Some("second-password".to_string());
        let second = create_initial_admin_user(&config, &storage).await.unwrap().unwrap();
        assert_eq!(first, second);

        let admin = storage.get_user(&second).await.unwrap().unwrap();
        assert!(admin.is_active);
        assert!(password::verify_password("second-password", &admin.password_hash).unwrap());
        assert!(!password::verify_password("first-password", &admin.password_hash).unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_no_admin_password_skips_admin_creation() {
        let config = create_test_config();
        let storage = InMemoryStorage::new();
        assert!(create_initial_admin_user(&config, &storage).await.unwrap().is_none());
        assert!(storage.get_user_by_username("admin").await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_routes_return_page_not_found() {
        let (app, _state) = create_test_app();
        let response = app.get("/api/nothing-here/").await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&serde_json::json!({ "error": "Page not found." }));
    }

    #[test_log::test(tokio::test)]
    async fn test_docs_and_health_endpoints() {
        let (app, _state) = create_test_app();
        app.get("/healthz").await.assert_status_ok();

        let openapi = app.get("/api-docs/openapi.json").await;
        openapi.assert_status_ok();
        assert!(openapi.text().contains("\"openapi\""));

        let docs = app.get("/doc/").await;
        docs.assert_status_ok();
        assert!(docs.text().contains("Swiggy API"));
    }

    #[test_log::test(tokio::test)]
    async fn test_application_runs_embedded_worker_for_memory_storage() {
        let mut config = create_test_config();
        config.admin_password = Some("admin-password".to_string());
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

        let app = Application::new_with_storage(config.clone(), storage).await.unwrap();
        let (server, bg_services) = app.into_test_server();

        let response = server
            .post("/api/users/login/")
            .json(&serde_json::json!({ "username": "admin", "password": "admin-password" }))
            .await;
        response.assert_status_ok();

        // Registration mail is delivered by the embedded worker
        server
            .post("/api/user/")
            .json(&serde_json::json!({ "username": "newbie", "email": "newbie@example.com" }))
            .await
            .assert_status(StatusCode::CREATED);
        let mut delivered = 0;
        for _ in 0..200 {
            delivered = emails_in(&config).len();
            if delivered > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(delivered, 1);

        bg_services.shutdown().await;
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_and_urls() {
        let mut config = create_test_config();
        config.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        config.cors.allow_credentials = true;
        assert!(create_cors_layer(&config).is_ok());
    }
}
