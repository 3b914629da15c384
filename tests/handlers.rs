//! HTTP tests for the public endpoints: status codes and response envelopes.

mod common;
use common::*;

use axum::http::StatusCode;
use serde_json::json;

// ============================================================================
// POST /activate
// ============================================================================

#[tokio::test]
async fn test_activate_success_envelope() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 2, future_timestamp(ONE_YEAR));

    let (status, body) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"code": code, "machine_id": "machine-a", "metadata": {"os": "macos"}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["machine_id"], "machine-a");
    assert_eq!(body["data"]["remaining_activations"], 1);
    assert_eq!(body["data"]["version"], "3.0");
    assert!(body["data"]["record_id"].as_str().unwrap().starts_with("act_rec_"));
}

#[tokio::test]
async fn test_activate_accepts_legacy_field_names() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, future_timestamp(ONE_YEAR));

    let (status, _) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"activation_code": code, "machine_id": "machine-a", "user_info": {"name": "x"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = queries::find_active_record(&db.conn(), &code, "machine-a")
        .unwrap()
        .unwrap();
    assert_eq!(record.activation_data, json!({"name": "x"}));
}

#[tokio::test]
async fn test_activate_records_client_headers() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, future_timestamp(ONE_YEAR));

    let body = json!({"code": code, "machine_id": "machine-a"}).to_string();
    let (status, _) = post_raw(
        test_app(db.state()),
        "/activate",
        body,
        &[
            ("x-forwarded-for", "198.51.100.4, 10.0.0.1"),
            ("user-agent", "client/3.0"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = queries::find_active_record(&db.conn(), &code, "machine-a")
        .unwrap()
        .unwrap();
    assert_eq!(record.ip_address.as_deref(), Some("198.51.100.4"));
    assert_eq!(record.user_agent.as_deref(), Some("client/3.0"));
}

#[tokio::test]
async fn test_activate_missing_machine_id_is_bad_request() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, future_timestamp(ONE_YEAR));

    let (status, body) =
        post_json(test_app(db.state()), "/activate", &json!({"code": code})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "missing_field");
}

#[tokio::test]
async fn test_activate_malformed_json_is_bad_request() {
    let db = setup_test_pool();
    let (status, body) = post_raw(
        test_app(db.state()),
        "/activate",
        "{not json".to_string(),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_activate_unknown_code_is_not_found() {
    let db = setup_test_pool();
    let (status, body) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"code": test_code(5), "machine_id": "machine-a"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "code_not_found");
}

#[tokio::test]
async fn test_activate_expired_code_is_forbidden() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, past_timestamp(ONE_DAY));

    let (status, body) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"code": code, "machine_id": "machine-a"}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "expired");
}

#[tokio::test]
async fn test_activate_same_machine_twice_is_conflict() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 2, future_timestamp(ONE_YEAR));
    let request = json!({"code": code, "machine_id": "machine-a"});

    let (status, _) = post_json(test_app(db.state()), "/activate", &request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(test_app(db.state()), "/activate", &request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_activated_on_device");
}

#[tokio::test]
async fn test_activate_exhausted_code_is_forbidden() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, future_timestamp(ONE_YEAR));

    let (status, _) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"code": code, "machine_id": "machine-a"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        test_app(db.state()),
        "/activate",
        &json!({"code": code, "machine_id": "machine-b"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "already_used");
}

/// Concurrent HTTP redemptions of one code cannot exceed its quota.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activate_cannot_exceed_quota() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 2, future_timestamp(ONE_YEAR));

    let mut handles = vec![];
    for i in 0..6 {
        let app = test_app(db.state());
        let request = json!({"code": code, "machine_id": format!("machine-{i}")});
        handles.push(tokio::spawn(async move {
            post_json(app, "/activate", &request).await.0
        }));
    }

    let mut successes = 0;
    let mut forbidden = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            successes += 1;
        } else if status == StatusCode::FORBIDDEN {
            forbidden += 1;
        } else {
            panic!("unexpected status {status}");
        }
    }

    assert_eq!(successes, 2);
    assert_eq!(forbidden, 4);
    assert_eq!(db.conn().lookup(&code).unwrap().current_activations, 2);
}

// ============================================================================
// POST /query
// ============================================================================

#[tokio::test]
async fn test_query_returns_records_and_summary() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 2, future_timestamp(ONE_YEAR));
    db.engine()
        .redeem(&redeem_request(&code, "machine-a"))
        .unwrap();

    let (status, body) =
        post_json(test_app(db.state()), "/query", &json!({"code": code})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["code_info"]["code"], code.as_str());
    assert_eq!(body["data"]["code_info"]["status"], "unused");
    assert_eq!(body["data"]["activation_records"][0]["machine_id"], "machine-a");
    assert_eq!(body["data"]["summary"]["total_activations"], 1);
    assert_eq!(body["data"]["summary"]["active_activations"], 1);
    assert_eq!(body["data"]["summary"]["can_activate"], true);
}

#[tokio::test]
async fn test_query_unknown_code_is_not_found() {
    let db = setup_test_pool();
    let (status, body) =
        post_json(test_app(db.state()), "/query", &json!({"code": test_code(3)})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "code_not_found");
}

// ============================================================================
// POST /validate
// ============================================================================

#[tokio::test]
async fn test_validate_valid_code() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 1, future_timestamp(ONE_YEAR));

    let (status, body) =
        post_json(test_app(db.state()), "/validate", &json!({"code": code})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert!(body["data"].get("reason").is_none());
    assert_eq!(body["data"]["code_info"]["max_activations"], 1);
}

#[tokio::test]
async fn test_validate_unknown_code_is_ok_but_invalid() {
    let db = setup_test_pool();
    let (status, body) = post_json(
        test_app(db.state()),
        "/validate",
        &json!({"code": "nonsense"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "code_not_found");
}

#[tokio::test]
async fn test_validate_missing_code_is_bad_request() {
    let db = setup_test_pool();
    let (status, body) = post_json(test_app(db.state()), "/validate", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_field");
}

// ============================================================================
// POST /status
// ============================================================================

#[tokio::test]
async fn test_status_reports_remaining() {
    let db = setup_test_pool();
    let code = test_code(1);
    create_test_code(&db.conn(), &code, 3, future_timestamp(30));

    let (status, body) =
        post_json(test_app(db.state()), "/status", &json!({"code": code})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "unused");
    assert_eq!(body["data"]["remaining_activations"], 3);
    assert_eq!(body["data"]["current_activations"], 0);
    assert!(body["data"].get("last_activated_at").is_none());
    let days = body["data"]["days_remaining"].as_i64().unwrap();
    assert!((29..=30).contains(&days));
}

#[tokio::test]
async fn test_status_unknown_code_is_not_found() {
    let db = setup_test_pool();
    let (status, body) =
        post_json(test_app(db.state()), "/status", &json!({"code": test_code(8)})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

// ============================================================================
// GET /health
// ============================================================================

#[tokio::test]
async fn test_health() {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    let db = setup_test_pool();
    let response = test_app(db.state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}
