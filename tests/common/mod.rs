//! Test utilities and fixtures for Activator integration tests

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use activator::config::DbSettings;
pub use activator::db::{AppState, DbPool, create_pool, init_db, queries};
pub use activator::error::{AppError, ErrorKind};
pub use activator::handlers;
pub use activator::models::*;
pub use activator::redemption::{RedeemRequest, RedemptionEngine};
pub use activator::registry::{self, CodeRegistry};
pub use activator::util::{CODE_ALPHABET, ClientInfo, SECONDS_PER_DAY, now};

pub const ONE_DAY: i64 = 1;
pub const ONE_YEAR: i64 = 365;

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * SECONDS_PER_DAY)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * SECONDS_PER_DAY)
}

/// A well-formed code that differs for each `n`.
pub fn test_code(n: usize) -> String {
    let alphabet = CODE_ALPHABET.as_bytes();
    let base = alphabet.len();
    let suffix: String = [n / (base * base), n / base, n]
        .iter()
        .map(|i| alphabet[i % base] as char)
        .collect();
    format!("ABCDEFGHJKLM{}", suffix)
}

/// Create an in-memory test database with schema initialized.
///
/// Only for single-connection tests: every in-memory connection is its own database.
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// A file-backed pool in a temp directory, so every pooled connection sees
/// the same database. The directory is removed when this is dropped.
pub struct TestDb {
    pub pool: DbPool,
    _dir: TempDir,
}

impl TestDb {
    pub fn conn(&self) -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        self.pool.get().expect("Failed to get db connection")
    }

    pub fn engine(&self) -> RedemptionEngine {
        RedemptionEngine::new(self.pool.clone())
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.pool.clone())
    }
}

pub fn setup_test_pool() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("activator-test.db");
    let pool = create_pool(
        path.to_str().expect("temp path is not utf-8"),
        DbSettings::default(),
    )
    .expect("Failed to create pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).expect("Failed to initialize schema");
    }
    TestDb { pool, _dir: dir }
}

/// Create an unused code with the given quota and expiry
pub fn create_test_code(
    conn: &Connection,
    code: &str,
    max_activations: i64,
    expire_date: i64,
) -> ActivationCode {
    let input = NewActivationCode {
        code: code.to_string(),
        max_activations,
        expire_date,
        version: "3.0".to_string(),
        notes: None,
    };
    queries::create_activation_code(conn, &input).expect("Failed to create test code")
}

/// Minimal redeem request for `code` on `machine_id`
pub fn redeem_request(code: &str, machine_id: &str) -> RedeemRequest {
    RedeemRequest {
        code: code.to_string(),
        machine_id: machine_id.to_string(),
        ..Default::default()
    }
}

/// Router with all endpoints, as served by the binary
pub fn test_app(state: AppState) -> Router {
    handlers::router().with_state(state)
}

/// POST a JSON body and return the status with the parsed response body
pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_raw(app, uri, serde_json::to_string(body).unwrap(), &[]).await
}

/// POST a raw body with extra headers
pub async fn post_raw(
    app: Router,
    uri: &str,
    body: String,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let response = app
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
