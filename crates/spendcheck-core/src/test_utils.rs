//! Test utilities for spendcheck-core
//!
//! A mock provider server standing in for OCR.space, the Gemini
//! `generateContent` API, the Google OAuth token endpoint and FCM, so the
//! real reqwest clients can be exercised end-to-end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::parsing::parse_amount;

/// Text returned by the mock OCR endpoint
pub const MOCK_RECEIPT_TEXT: &str =
    "CAFE MOCHA\nCappuccino 180.00\nBrownie 70.00\nTOTAL 250.00\nThank you for visiting";

/// Model name that makes the mock Gemini endpoint fail
pub const FAILING_MODEL: &str = "failing-model";

/// Device token the mock FCM endpoint rejects as unregistered
pub const UNREGISTERED_TOKEN: &str = "unregistered-token";

#[derive(Clone, Default)]
struct MockState {
    push_messages: Arc<Mutex<Vec<Value>>>,
    model_calls: Arc<Mutex<Vec<Value>>>,
}

/// Mock provider server for testing and development
pub struct MockProviderServer {
    addr: SocketAddr,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/parse/image", post(handle_ocr))
            .route("/v1beta/models", get(handle_list_models))
            .route("/v1beta/models/*model_action", post(handle_generate))
            .route("/token", post(handle_token))
            .route("/v1/projects/*rest", post(handle_fcm_send))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// FCM messages received so far (the `message` objects)
    pub fn push_messages(&self) -> Vec<Value> {
        self.state.push_messages.lock().unwrap().clone()
    }

    /// `generateContent` request bodies received so far
    pub fn model_calls(&self) -> Vec<Value> {
        self.state.model_calls.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// OCR.space parse endpoint; URLs containing "blank" yield no text
async fn handle_ocr(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let blank = form.get("url").is_some_and(|u| u.contains("blank"));
    let text = if blank { "" } else { MOCK_RECEIPT_TEXT };
    Json(json!({
        "ParsedResults": [{"ParsedText": text, "FileParseExitCode": 1}],
        "OCRExitCode": 1,
        "IsErroredOnProcessing": false
    }))
}

async fn handle_list_models() -> Json<Value> {
    Json(json!({"models": [{"name": "models/gemini-1.5-flash"}]}))
}

/// Gemini generateContent; answers are chosen from the prompt text
async fn handle_generate(
    State(state): State<MockState>,
    Path(model_action): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    state.model_calls.lock().unwrap().push(request.clone());

    let model = model_action.split(':').next().unwrap_or_default();
    if model == FAILING_MODEL {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"code": 500, "message": "model overloaded"}})),
        )
            .into_response();
    }

    let prompt = request["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();
    let answer = mock_answer(prompt);

    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": answer}]},
            "finishReason": "STOP"
        }]
    }))
    .into_response()
}

fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    let from = prompt.find(start).map(|i| i + start.len()).unwrap_or(0);
    let rest = &prompt[from..];
    rest.find(end).map(|i| &rest[..i]).unwrap_or(rest)
}

fn mock_answer(prompt: &str) -> String {
    if prompt.contains("'Income' or 'Expense'") {
        let text = section(prompt, "Text: ", "\n\nRespond").to_lowercase();
        if text.contains("salary") || text.contains("credited") {
            "Income".to_string()
        } else {
            "Expense".to_string()
        }
    } else if prompt.contains("Extract the total amount") {
        let receipt = section(prompt, "Receipt text:", "Response format:").to_lowercase();
        let amount = receipt
            .rfind("total")
            .and_then(|i| parse_amount(&receipt[i..]))
            .or_else(|| parse_amount(&receipt));
        match amount {
            Some(a) => format!("{:.2}", a),
            None => "None".to_string(),
        }
    } else if prompt.contains("Categorize the following transaction") {
        let text = section(prompt, "Text: ", "\n\nRespond").to_lowercase();
        if text.contains("cafe") || text.contains("coffee") || text.contains("lunch") {
            "Food & Dining".to_string()
        } else if text.contains("uber") || text.contains("taxi") {
            "Transportation".to_string()
        } else {
            "Miscellaneous".to_string()
        }
    } else if prompt.contains("budgeting tip") {
        "Cook at home twice a week.".to_string()
    } else if prompt.contains("Monthly Income") {
        "Dining out is your most flexible cost; halve it this month.".to_string()
    } else if prompt.contains("projected end-of-month") {
        "You are on track to overspend. Cut ₹50 a day.".to_string()
    } else {
        String::new()
    }
}

/// OAuth2 token endpoint for service-account assertions
async fn handle_token() -> Json<Value> {
    Json(json!({
        "access_token": "mock-access-token",
        "expires_in": 3600,
        "token_type": "Bearer"
    }))
}

/// FCM HTTP v1 messages:send
async fn handle_fcm_send(
    State(state): State<MockState>,
    Path(rest): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    if !rest.ends_with("messages:send") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let message = request["message"].clone();
    if message["token"] == UNREGISTERED_TOKEN {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": 404, "status": "NOT_FOUND", "details": [{"errorCode": "UNREGISTERED"}]}})),
        )
            .into_response();
    }

    let mut messages = state.push_messages.lock().unwrap();
    messages.push(message);
    let project = rest.split('/').next().unwrap_or_default();
    Json(json!({"name": format!("projects/{}/messages/{}", project, messages.len())}))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, GeminiBackend};
    use crate::google_auth::TokenSource;
    use crate::model_router::{ModelRouter, RouterConfig};
    use crate::ocr::{OcrBackend, OcrFileType, OcrSource, OcrSpaceBackend};
    use crate::prompts::PromptLibrary;
    use crate::push::{FcmBackend, PushBackend};

    fn gemini(server: &MockProviderServer, model: &str) -> GeminiBackend {
        GeminiBackend::with_router(
            &server.url(),
            "test-key",
            model,
            ModelRouter::with_config(RouterConfig {
                default_model: model.to_string(),
                default_retries: 0,
                ..Default::default()
            }),
        )
        .with_prompts(PromptLibrary::embedded_only())
    }

    #[tokio::test]
    async fn test_mock_server_ocr() {
        let server = MockProviderServer::start().await;
        let ocr = OcrSpaceBackend::new(&server.url(), "key");

        let text = ocr
            .extract_text(&OcrSource::Url {
                url: "https://files.example/receipt.png".into(),
                file_type: OcrFileType::Png,
            })
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some(MOCK_RECEIPT_TEXT));

        let blank = ocr
            .extract_text(&OcrSource::Url {
                url: "https://files.example/blank.png".into(),
                file_type: OcrFileType::Png,
            })
            .await
            .unwrap();
        assert!(blank.is_none());
    }

    #[tokio::test]
    async fn test_mock_server_gemini_extraction() {
        let server = MockProviderServer::start().await;
        let backend = gemini(&server, "gemini-1.5-flash");

        assert!(backend.health_check().await);
        assert_eq!(
            backend
                .detect_transaction_type(MOCK_RECEIPT_TEXT)
                .await
                .unwrap(),
            crate::ai::DetectedType::Expense
        );
        assert_eq!(
            backend.extract_total_amount(MOCK_RECEIPT_TEXT).await.unwrap(),
            Some(250.0)
        );
        assert_eq!(
            backend.categorize_expense(MOCK_RECEIPT_TEXT).await.unwrap(),
            "Food & Dining"
        );

        let calls = server.model_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0]["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("financial analysis"));
    }

    #[tokio::test]
    async fn test_mock_server_gemini_failure_marks_unhealthy() {
        let server = MockProviderServer::start().await;
        let backend = gemini(&server, FAILING_MODEL);

        assert!(backend.budget_tip("Food", 95.0, 100.0).await.is_err());
        assert!(backend.budget_tip("Food", 95.0, 100.0).await.is_err());
        assert!(backend.budget_tip("Food", 95.0, 100.0).await.is_err());
        assert_eq!(server.model_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_server_fcm() {
        let server = MockProviderServer::start().await;
        let fcm = FcmBackend::new(&server.url(), "demo", TokenSource::Static("t".into()));

        let receipt = fcm.send("device-1", "Budget Warning!", "Careful").await.unwrap();
        assert_eq!(
            receipt.message_id.as_deref(),
            Some("projects/demo/messages/1")
        );
        let messages = server.push_messages();
        assert_eq!(messages[0]["token"], "device-1");
        assert_eq!(messages[0]["android"]["notification"]["channel_id"], "default_channel");

        assert!(fcm
            .send(UNREGISTERED_TOKEN, "Budget Warning!", "Careful")
            .await
            .is_err());
    }
}
