//! SpendCheck Web Server
//!
//! Axum-based REST API for the SpendCheck personal finance backend.
//!
//! User routes require a Firebase ID token (`--no-auth` skips this for local
//! development) and `/api/users/:uid/...` only serves the token's own uid.
//! Admin job routes take an API key. Internal errors reach clients as a
//! generic message and are logged in full.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use spendcheck_core::{
    AIBackend, AIClient, Database, NotificationJobs, OcrClient, PushClient, StorageClient,
};

mod auth;
mod handlers;
mod scheduler;

pub use auth::{AuthUser, TokenVerifier};
pub use scheduler::{start_job_scheduler, JobScheduleConfig};

/// Largest accepted upload body
pub const MAX_UPLOAD_SIZE: usize = spendcheck_core::storage::MAX_UPLOAD_BYTES;

#[derive(Clone)]
pub struct ServerConfig {
    /// Whether token verification is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Keys accepted as `Authorization: Bearer <key>` on admin routes
    pub api_keys: Vec<String>,
    /// How bearer tokens on user routes are verified
    pub verifier: Option<TokenVerifier>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            verifier: None,
        }
    }
}

impl ServerConfig {
    /// Read `SPENDCHECK_API_KEYS`, `SPENDCHECK_CORS_ORIGINS` and the token
    /// verifier settings from the environment
    pub fn from_env(require_auth: bool) -> Self {
        Self {
            require_auth,
            allowed_origins: split_list(&std::env::var("SPENDCHECK_CORS_ORIGINS").unwrap_or_default()),
            api_keys: split_list(&std::env::var("SPENDCHECK_API_KEYS").unwrap_or_default()),
            verifier: TokenVerifier::from_env(),
        }
    }
}

/// Split a comma-separated list, dropping empty entries
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
    pub ocr: Option<OcrClient>,
    pub push: PushClient,
    pub storage: Option<StorageClient>,
}

impl AppState {
    /// Build state with every provider configured from the environment
    pub fn from_env(db: Database, config: ServerConfig) -> Self {
        let ai = AIClient::from_env();
        if let Some(client) = &ai {
            let routes = client.router_info();
            info!(
                backend = client.backend_name(),
                host = client.host(),
                model = %routes.default_model,
                fallback = routes.fallback_model.as_deref().unwrap_or("-"),
                "AI backend configured"
            );
            for (task, model) in &routes.task_models {
                info!(task = %task, model = %model, "Task model");
            }
        } else {
            info!("ℹ️  AI backend not configured (set GEMINI_API_KEY to enable extraction)");
        }

        let ocr = OcrClient::from_env();
        match &ocr {
            Some(client) => info!("OCR configured: {}", client.describe()),
            None => info!("ℹ️  OCR not configured (set OCR_SPACE_API_KEY to enable receipt scanning)"),
        }

        let push = PushClient::from_env();
        info!("Push notifications: {}", push.describe());

        let storage = StorageClient::from_env();
        match &storage {
            Some(client) => info!("File storage: {}", client.describe()),
            None => warn!("File storage not configured; uploads are disabled"),
        }

        Self {
            db,
            config,
            ai,
            ocr,
            push,
            storage,
        }
    }

    /// Notification jobs over this state's store and providers
    pub fn jobs(&self) -> NotificationJobs {
        NotificationJobs::new(self.db.clone(), self.ai.clone(), self.push.clone())
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Create the application router with providers configured from the environment
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    create_app(AppState::from_env(db, config))
}

/// Create the application router over prepared state
pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();
    let state = Arc::new(state);

    let user_routes = Router::new()
        // Identity
        .route("/api/me", get(handlers::get_me))
        // Transactions
        .route(
            "/api/users/:uid/transactions",
            get(handlers::list_transactions).post(handlers::add_transaction),
        )
        .route(
            "/api/users/:uid/transactions/monthly-analysis",
            get(handlers::monthly_analysis),
        )
        .route(
            "/api/users/:uid/transactions/:id",
            get(handlers::get_transaction)
                .patch(handlers::update_transaction)
                .delete(handlers::delete_transaction),
        )
        // Analytics
        .route(
            "/api/users/:uid/analytics/categories",
            get(handlers::category_analytics),
        )
        .route(
            "/api/users/:uid/analytics/monthly",
            get(handlers::monthly_analytics),
        )
        // Budgets
        .route(
            "/api/users/:uid/budgets",
            get(handlers::list_budgets).post(handlers::save_budget),
        )
        .route(
            "/api/users/:uid/budgets/:month",
            get(handlers::get_budget).delete(handlers::delete_budget),
        )
        .route(
            "/api/users/:uid/get_budget_summary/:month",
            get(handlers::get_budget_summary),
        )
        // Devices and notifications
        .route("/api/users/:uid/fcm-token", put(handlers::set_fcm_token))
        .route(
            "/api/users/:uid/notifications/check",
            post(handlers::check_notifications),
        )
        // Uploads and extraction
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 64 * 1024)),
        )
        .route("/extract-text", post(handlers::extract_text))
        .route("/parse-voice-text", post(handlers::parse_voice_text))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::token_middleware,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/jobs/:job/run", post(handlers::run_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_middleware,
        ));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let mut cors = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    // No configured origins means same-origin only
    if !config.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        cors = cors.allow_origin(origins);
    }

    Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

/// Bind `host:port` and serve until the process exits. Starts the job
/// scheduler when `SPENDCHECK_JOB_INTERVAL_HOURS` is set.
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Running without authentication; keep this server off shared networks");
    } else if config.verifier.is_none() {
        warn!("⚠️  No token verifier configured (set FIREBASE_PROJECT_ID); user routes will return 503");
    }

    let state = AppState::from_env(db, config);
    check_ai_connection(state.ai.as_ref()).await;

    if let Some(schedule) = JobScheduleConfig::from_env() {
        start_job_scheduler(state.jobs(), schedule);
    }

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "SpendCheck API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// One health probe at startup; an unreachable backend is logged, not fatal
async fn check_ai_connection(ai: Option<&AIClient>) {
    let Some(client) = ai else {
        return;
    };
    if client.health_check().await {
        info!(host = client.host(), model = client.model(), "✅ AI backend reachable");
    } else {
        warn!(host = client.host(), model = client.model(), "⚠️  AI backend not responding");
    }
}

/// Handler error carrying the status and the client-facing message
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn service_unavailable(msg: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    /// Upstream provider failure; the cause is logged, not returned
    pub fn bad_gateway(msg: &str, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.to_string(),
            internal: Some(cause.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(error = %err, status = %self.status, "Request failed");
        }

        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        // Caller mistakes keep their message; everything else is generic
        match err.downcast_ref::<spendcheck_core::Error>() {
            Some(spendcheck_core::Error::InvalidData(msg)) => return Self::bad_request(msg),
            Some(spendcheck_core::Error::NotFound(msg)) => return Self::not_found(msg),
            Some(spendcheck_core::Error::NotConfigured(service)) => {
                return Self::service_unavailable(&format!("{} not configured", service))
            }
            _ => {}
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Something went wrong on our side".to_string(),
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
