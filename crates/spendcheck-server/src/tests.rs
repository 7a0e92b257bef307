//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use spendcheck_core::{LocalStorage, MockOcr, MockPush};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "test-token-secret";
const ADMIN_KEY: &str = "admin-key";
const RECEIPT: &str = "CAFE MOCHA\nCappuccino 180.00\nBrownie 70.00\nTOTAL 250.00";

struct TestApp {
    app: Router,
    db: Database,
    push: MockPush,
    _uploads: TempDir,
}

fn setup_with(require_auth: bool, ocr: Option<OcrClient>) -> TestApp {
    let db = Database::in_memory().unwrap();
    let uploads = TempDir::new().unwrap();
    let push = MockPush::new();
    let state = AppState {
        db: db.clone(),
        config: ServerConfig {
            require_auth,
            allowed_origins: vec![],
            api_keys: vec![ADMIN_KEY.to_string()],
            verifier: Some(TokenVerifier::shared_secret(SECRET)),
        },
        ai: Some(AIClient::mock()),
        ocr,
        push: PushClient::Mock(push.clone()),
        storage: Some(StorageClient::Local(LocalStorage::new(uploads.path()))),
    };
    TestApp {
        app: create_app(state),
        db,
        push,
        _uploads: uploads,
    }
}

fn setup_test_app() -> TestApp {
    setup_with(true, Some(OcrClient::Mock(MockOcr::with_text(RECEIPT))))
}

fn token_for(uid: &str) -> String {
    let claims = json!({
        "sub": uid,
        "email": format!("{}@example.com", uid),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: &str, uri: &str, uid: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(uid) = uid {
        builder = builder.header("authorization", format!("Bearer {}", token_for(uid)));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn add_tx(app: &Router, uid: &str, body: Value) -> String {
    let (status, json) = send(
        app,
        request("POST", &format!("/api/users/{}/transactions", uid), Some(uid), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    json["id"].as_str().unwrap().to_string()
}

// ========== Authentication Tests ==========

#[tokio::test]
async fn test_missing_token_rejected() {
    let t = setup_test_app();
    let (status, json) = send(&t.app, request("GET", "/api/users/alice/transactions", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Invalid authorization header");
}

#[tokio::test]
async fn test_bad_token_rejected() {
    let t = setup_test_app();
    let request = Request::builder()
        .uri("/api/users/alice/transactions")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid token:"));
}

#[tokio::test]
async fn test_other_users_data_forbidden() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/alice/transactions", Some("mallory"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Unauthorized access");
}

#[tokio::test]
async fn test_get_me() {
    let t = setup_test_app();
    let (status, json) = send(&t.app, request("GET", "/api/me", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["uid"], "alice");
    assert_eq!(json["email"], "alice@example.com");
}

#[tokio::test]
async fn test_no_auth_mode_uses_path_user() {
    let t = setup_with(false, None);
    let (status, _) = send(&t.app, request("GET", "/api/users/bob/budgets", None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_no_auth_mode_decodes_path_user() {
    let t = setup_with(false, None);
    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/bob%20smith/budgets", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
}

#[tokio::test]
async fn test_security_headers() {
    let t = setup_test_app();
    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/api/me", Some("alice"), None))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_add_and_list_transactions() {
    let t = setup_test_app();
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 450, "transactionType": "Expense", "category": "Food & Dining", "date": "2025-03-02T12:00:00Z"}),
    )
    .await;
    add_tx(
        &t.app,
        "alice",
        json!({"amount": "1200", "transactionType": "Expense", "category": "Shopping", "date": "2025-03-05T12:00:00Z"}),
    )
    .await;
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 50000, "transactionType": "Income", "date": "2025-03-01T09:00:00Z"}),
    )
    .await;

    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/alice/transactions", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["category"], "Shopping");

    let (_, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions?category=Shopping&startDate=2025-03-01",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_transaction_validation() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/api/users/alice/transactions",
            Some("alice"),
            Some(json!({"amount": 100, "transactionType": "Expense"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing category for Expense transactions");

    let (status, _) = send(
        &t.app,
        request(
            "POST",
            "/api/users/alice/transactions",
            Some("alice"),
            Some(json!({"transactionType": "Income"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_transactions_bad_dates() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions?startDate=03-01-2025",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid start date format");

    let (status, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions?endDate=soon",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid end date format");
}

#[tokio::test]
async fn test_update_and_delete_transaction() {
    let t = setup_test_app();
    let id = add_tx(
        &t.app,
        "alice",
        json!({"amount": 300, "transactionType": "Expense", "category": "Travel"}),
    )
    .await;
    let uri = format!("/api/users/alice/transactions/{}", id);

    let (status, json) = send(
        &t.app,
        request(
            "PATCH",
            &uri,
            Some("alice"),
            Some(json!({"bill": {"url": "https://files.example/bill.pdf"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["bill"]["url"], "https://files.example/bill.pdf");

    let (status, _) = send(&t.app, request("PATCH", &uri, Some("alice"), Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, request("DELETE", &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&t.app, request("GET", &uri, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Transaction not found");
}

#[tokio::test]
async fn test_transaction_id_cannot_reach_other_user() {
    let t = setup_test_app();
    let bobs = add_tx(
        &t.app,
        "bob",
        json!({"amount": 75, "transactionType": "Expense", "category": "Travel"}),
    )
    .await;
    let uri = format!(
        "/api/users/alice/transactions/..%2F..%2Fbob%2Ftransactions%2F{}",
        bobs
    );

    for method in ["GET", "DELETE"] {
        let (status, _) = send(&t.app, request(method, &uri, Some("alice"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", method);
    }
    let (status, _) = send(
        &t.app,
        request("PATCH", &uri, Some("alice"), Some(json!({"notes": "mine now"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stored = t.db.get_transaction("bob", &bobs).await.unwrap().unwrap();
    assert_eq!(stored.amount, 75.0);
    assert_eq!(stored.notes, None);
}

// ========== Analytics API Tests ==========

#[tokio::test]
async fn test_category_and_monthly_analytics() {
    let t = setup_test_app();
    for (amount, category, date) in [
        (300, "Food & Dining", "2025-01-10T10:00:00Z"),
        (100, "Shopping", "2025-01-20T10:00:00Z"),
        (600, "Food & Dining", "2025-02-03T10:00:00Z"),
    ] {
        add_tx(
            &t.app,
            "alice",
            json!({"amount": amount, "transactionType": "Expense", "category": category, "date": date}),
        )
        .await;
    }

    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/alice/analytics/categories", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalSpent"], 1000.0);
    assert_eq!(json["categories"][0]["category"], "Food & Dining");
    assert_eq!(json["categories"][0]["percentage"], 90.0);

    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/alice/analytics/monthly", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let months = json["months"].as_array().unwrap();
    assert_eq!(months.len(), 2);
    assert_eq!(months[0]["month"], "Jan 2025");
    assert_eq!(months[1]["change_percentage"], 50.0);
}

#[tokio::test]
async fn test_monthly_analysis() {
    let t = setup_test_app();
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 250, "transactionType": "Expense", "category": "Travel", "date": "2025-01-15T00:00:00Z"}),
    )
    .await;

    let (status, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions/monthly-analysis?startDate=2025-01-01",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "startDate and endDate are required");

    let (status, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions/monthly-analysis?startDate=2025/01/01&endDate=2025-02-01",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid date format. Use YYYY-MM-DD");

    let (status, json) = send(
        &t.app,
        request(
            "GET",
            "/api/users/alice/transactions/monthly-analysis?startDate=2025-01-01&endDate=2025-02-01",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transactions"][0]["date"], "2025-01-15");
    assert_eq!(json["categorySummary"]["Travel"], 250.0);
    assert_eq!(json["monthlySummary"][0]["rawMonth"], "2025-01");
}

// ========== Budget API Tests ==========

#[tokio::test]
async fn test_budget_lifecycle() {
    let t = setup_test_app();
    let base = "/api/users/alice/budgets";

    let (status, json) = send(
        &t.app,
        request(
            "POST",
            base,
            Some("alice"),
            Some(json!({"month": "2025-03", "budgets": {"Food & Dining": 5000}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["message"], "Budget saved successfully");

    let (status, json) = send(
        &t.app,
        request("GET", &format!("{}/2025-03", base), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["budget"]["budgets"]["Food & Dining"], 5000);

    let (status, json) = send(&t.app, request("GET", base, Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["budgets"]["2025-03"].is_object());

    let (status, _) = send(
        &t.app,
        request("DELETE", &format!("{}/2025-03", base), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &t.app,
        request("GET", &format!("{}/2025-03", base), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "No budget found for this month");
}

#[tokio::test]
async fn test_save_budget_requires_fields() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/api/users/alice/budgets",
            Some("alice"),
            Some(json!({"month": "2025-03"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required fields: month and budgets");
}

#[tokio::test]
async fn test_budget_summary() {
    let t = setup_test_app();
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 700, "transactionType": "Expense", "category": "Food & Dining", "date": "2025-03-04T10:00:00Z"}),
    )
    .await;
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 9000, "transactionType": "Income", "date": "2025-03-01T10:00:00Z"}),
    )
    .await;
    add_tx(
        &t.app,
        "alice",
        json!({"amount": 80, "transactionType": "Expense", "category": "Food & Dining", "date": "2025-02-27T10:00:00Z"}),
    )
    .await;

    let (status, json) = send(
        &t.app,
        request("GET", "/api/users/alice/get_budget_summary/2025-03", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["budgets"], json!({}));
    assert_eq!(json["spent"], json!({"Food & Dining": 700.0}));
}

// ========== Extraction and Upload Tests ==========

#[tokio::test]
async fn test_extract_text() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/extract-text",
            Some("alice"),
            Some(json!({"fileUrl": "https://files.example/receipt.jpg", "fileType": "jpg"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["transactionType"], "Expense");
    assert_eq!(json["amount"], 250.0);
    assert_eq!(json["category"], "Food & Dining");
}

#[tokio::test]
async fn test_extract_text_errors() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request("POST", "/extract-text", Some("alice"), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file URL provided");

    let blank = setup_with(true, Some(OcrClient::Mock(MockOcr::empty())));
    let (status, json) = send(
        &blank.app,
        request(
            "POST",
            "/extract-text",
            Some("alice"),
            Some(json!({"fileUrl": "https://files.example/blank.png"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "OCR extraction failed");

    let no_ocr = setup_with(true, None);
    let (status, json) = send(
        &no_ocr.app,
        request(
            "POST",
            "/extract-text",
            Some("alice"),
            Some(json!({"fileUrl": "https://files.example/receipt.png"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "OCR not configured");
}

#[tokio::test]
async fn test_parse_voice_text() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request(
            "POST",
            "/parse-voice-text",
            Some("alice"),
            Some(json!({"text": "Salary credited 42000"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transaction_type"], "Income");
    assert_eq!(json["amount"], 42000.0);
    assert!(json["category"].is_null());

    let (status, json) = send(
        &t.app,
        request("POST", "/parse-voice-text", Some("alice"), Some(json!({"text": ""}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No text provided");
}

fn multipart_request(field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let boundary = "spendcheck-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            f = field,
            n = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("authorization", format!("Bearer {}", token_for("alice")))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_file() {
    let t = setup_test_app();
    let (status, json) = send(&t.app, multipart_request("file", "bill.pdf", b"%PDF-1.4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(json["url"].as_str().unwrap().ends_with("bill.pdf"));

    let (status, json) = send(&t.app, multipart_request("other", "bill.pdf", b"%PDF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file uploaded");

    let (status, _) = send(&t.app, multipart_request("file", "script.sh", b"echo")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ========== Notification API Tests ==========

#[tokio::test]
async fn test_fcm_token_and_notification_check() {
    let t = setup_test_app();
    let month = chrono::Utc::now().format("%Y-%m").to_string();

    let (status, _) = send(
        &t.app,
        request(
            "PUT",
            "/api/users/alice/fcm-token",
            Some("alice"),
            Some(json!({"token": "alice-device"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    add_tx(
        &t.app,
        "alice",
        json!({"amount": 1500, "transactionType": "Expense", "category": "Shopping"}),
    )
    .await;
    send(
        &t.app,
        request(
            "POST",
            "/api/users/alice/budgets",
            Some("alice"),
            Some(json!({"month": month, "budgets": {"Shopping": 1000}})),
        ),
    )
    .await;

    let (status, json) = send(
        &t.app,
        request("POST", "/api/users/alice/notifications/check", Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reports"].as_array().unwrap().len(), 4);
    assert_eq!(json["reports"][0]["job"], "budget-limits");
    assert_eq!(json["reports"][0]["notificationsSent"], 1);

    let sent = t.push.sent();
    assert_eq!(sent[0].title, "Budget Limit Exceeded!");
    assert_eq!(sent[0].token, "alice-device");
}

#[tokio::test]
async fn test_fcm_token_required() {
    let t = setup_test_app();
    let (status, json) = send(
        &t.app,
        request("PUT", "/api/users/alice/fcm-token", Some("alice"), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No token provided");
}

// ========== Admin API Tests ==========

fn admin_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_admin_job_run() {
    let t = setup_test_app();
    t.db.set_fcm_token("alice", "alice-device").await.unwrap();
    t.db.set_fcm_token("bob", "bob-device").await.unwrap();

    let (status, json) = send(
        &t.app,
        admin_request("/api/admin/jobs/budget-limits/run", Some(ADMIN_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reports"][0]["usersChecked"], 2);

    let (status, json) = send(&t.app, admin_request("/api/admin/jobs/all/run", Some(ADMIN_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reports"].as_array().unwrap().len(), 4);

    let (status, _) = send(&t.app, admin_request("/api/admin/jobs/nightly/run", Some(ADMIN_KEY))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_requires_api_key() {
    let t = setup_test_app();
    let (status, _) = send(&t.app, admin_request("/api/admin/jobs/forecast/run", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A user token is not an admin key
    let (status, _) = send(
        &t.app,
        admin_request("/api/admin/jobs/forecast/run", Some(&token_for("alice"))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
