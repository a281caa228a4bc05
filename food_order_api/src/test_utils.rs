//! Test utilities: in-memory application state, seeded users, products and orders, and helpers
//! to drive the task worker by hand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{password, session},
    config::{AuthConfig, Config, EmailConfig, EmailTransportConfig, PasswordConfig, WorkerConfig},
    db::{
        models::{
            orders::{OrderCreateDBRequest, OrderDBResponse, OrderItem},
            products::{ProductCreateDBRequest, ProductDBResponse},
            users::{UserCreateDBRequest, UserDBResponse, UserType},
        },
        storage::{Storage, in_memory::InMemoryStorage},
    },
    tasks::{TaskQueue, worker::Worker},
};

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn create_test_config() -> Config {
    // Each config mails into its own directory so tests can count what they sent
    let email_dir = std::env::temp_dir().join(format!("food-order-test-emails-{}", Uuid::new_v4().simple()));

    Config {
        secret_key: Some("test-secret-key-for-jwt".to_string()),
        auth: AuthConfig {
            password: PasswordConfig {
                argon2_memory_kib: 128,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..Default::default()
            },
            ..Default::default()
        },
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: email_dir.to_string_lossy().into_owned(),
            },
            ..Default::default()
        },
        worker: WorkerConfig {
            // Tests that exercise the directory wait set their own
            app_dir: None,
            embedded: false,
            events: false,
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_state() -> AppState {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    AppState::builder()
        .storage(storage.clone())
        .config(create_test_config())
        .tasks(TaskQueue::new(storage))
        .build()
}

/// Router over a fresh in-memory state. No worker runs; use [`run_worker`] to drain the queue.
pub fn create_test_app() -> (TestServer, AppState) {
    let state = create_test_state();
    let router = crate::build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state)
}

/// Create an active user whose password is [`TEST_PASSWORD`].
pub async fn create_test_user(state: &AppState, username: &str, user_type: UserType) -> UserDBResponse {
    let password_hash =
        password::hash_password(TEST_PASSWORD, state.config.auth.password.argon2_params()).expect("Failed to hash password");
    state
        .storage
        .create_user(&UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            phone: None,
            user_type,
            password_hash,
        })
        .await
        .expect("Failed to create test user")
}

pub fn access_token(state: &AppState, user: &UserDBResponse) -> String {
    session::issue_token_pair(user, &state.config)
        .expect("Failed to issue token pair")
        .access
}

pub async fn create_test_product(state: &AppState, name: &str, price: &str) -> ProductDBResponse {
    let request = ProductCreateDBRequest {
        name: name.to_string(),
        description: format!("{name} description"),
        price: price.parse().expect("Invalid test price"),
        image: None,
    };
    state
        .storage
        .create_products(&[request])
        .await
        .expect("Failed to create test product")
        .remove(0)
}

/// Place an order directly in storage; no confirmation email is queued.
pub async fn create_test_order(
    state: &AppState,
    customer: &UserDBResponse,
    product: &ProductDBResponse,
    quantity: i32,
) -> OrderDBResponse {
    state
        .storage
        .create_order(&OrderCreateDBRequest {
            user_id: customer.id.clone(),
            items: vec![OrderItem {
                product: product.id.clone(),
                quantity,
            }],
            total_amount: product.price * Decimal::from(quantity),
            payment_option: "cash".to_string(),
            otp: password::random_alphanumeric(8),
        })
        .await
        .expect("Failed to create test order")
}

pub fn create_test_worker(state: &AppState) -> Worker {
    Worker::new(&state.config, state.storage.clone(), &state.tasks).expect("Failed to create test worker")
}

/// Run every queued task to completion. Returns how many ran.
pub async fn run_worker(state: &AppState) -> usize {
    create_test_worker(state)
        .run_pending()
        .await
        .expect("Failed to run pending tasks")
}

fn email_dir(config: &Config) -> Option<PathBuf> {
    match &config.email.transport {
        EmailTransportConfig::File { path } => Some(PathBuf::from(path)),
        EmailTransportConfig::Smtp { .. } => None,
    }
}

/// Raw messages written by the file mail transport for `config`.
pub fn emails_in(config: &Config) -> Vec<String> {
    let Some(dir) = email_dir(config) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "eml"))
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .collect()
}

pub fn sent_emails(state: &AppState) -> Vec<String> {
    emails_in(&state.config)
}
