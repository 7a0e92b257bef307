//! Bearer token verification
//!
//! User routes carry `Authorization: Bearer <token>`. In production the
//! token is a Firebase ID token (RS256, checked against Google's securetoken
//! JWKS); for local development and tests an HS256 token signed with
//! `SPENDCHECK_DEV_TOKEN_SECRET` is accepted instead. The verified identity
//! is stored in the request extensions as an [`AuthUser`].
//!
//! Admin routes use static API keys from `SPENDCHECK_API_KEYS`, compared in
//! constant time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
    RequestExt,
};
use jsonwebtoken::{decode, decode_header, jwk::Jwk, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use spendcheck_core::google_auth::{project_id_from_env, ServiceAccountKey};

use crate::{AppError, AppState};

/// Public keys for Firebase ID tokens
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// How long fetched public keys are reused
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Identity used when authentication is disabled and the path names no user
const LOCAL_DEV_USER: &str = "local-dev";

/// The caller, as established by token verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

impl AuthUser {
    /// Reject access to another user's data
    pub fn ensure_owner(&self, uid: &str) -> Result<(), AppError> {
        if self.uid == uid {
            Ok(())
        } else {
            warn!(user_id = %self.uid, requested = %uid, "Cross-user access denied");
            Err(AppError::forbidden("Unauthorized access"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Clone)]
struct CachedKeys {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

/// Firebase ID token verification against Google's JWKS
#[derive(Clone)]
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: String,
    http_client: reqwest::Client,
    keys: Arc<RwLock<Option<CachedKeys>>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: &str) -> Self {
        Self::with_jwks_url(project_id, FIREBASE_JWKS_URL)
    }

    pub fn with_jwks_url(project_id: &str, jwks_url: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            jwks_url: jwks_url.to_string(),
            http_client: reqwest::Client::new(),
            keys: Arc::new(RwLock::new(None)),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn keys(&self) -> Result<Vec<Jwk>, String> {
        if let Some(cached) = self.keys.read().await.as_ref() {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                return Ok(cached.keys.clone());
            }
        }

        let keys = fetch_public_keys(&self.http_client, &self.jwks_url).await?;
        debug!(count = keys.len(), "Fetched Firebase public keys");
        *self.keys.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn verify(&self, token: &str) -> Result<AuthUser, String> {
        let header = decode_header(token).map_err(|e| format!("Invalid JWT header: {}", e))?;
        let kid = header.kid.ok_or("JWT missing key ID (kid)")?;

        let keys = self.keys().await?;
        let jwk = keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid.as_str()))
            .ok_or_else(|| format!("No matching key found for kid: {}", kid))?;
        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| format!("Invalid JWK: {}", e))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            self.project_id
        )]);

        let data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| format!("JWT validation failed: {}", e))?;
        if data.claims.sub.is_empty() {
            return Err("JWT has an empty subject".into());
        }
        Ok(AuthUser {
            uid: data.claims.sub,
            email: data.claims.email,
        })
    }
}

async fn fetch_public_keys(client: &reqwest::Client, url: &str) -> Result<Vec<Jwk>, String> {
    #[derive(Deserialize)]
    struct JwkSet {
        keys: Vec<Jwk>,
    }

    let response = client
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| format!("Failed to fetch public keys: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("Failed to fetch public keys: HTTP {}", response.status()));
    }

    let set: JwkSet = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse JWK set: {}", e))?;
    Ok(set.keys)
}

/// HS256 tokens signed with a shared secret (development and tests)
#[derive(Clone)]
pub struct SharedSecretVerifier {
    key: DecodingKey,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    fn verify(&self, token: &str) -> Result<AuthUser, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &self.key, &validation)
            .map_err(|e| format!("JWT validation failed: {}", e))?;
        Ok(AuthUser {
            uid: data.claims.sub,
            email: data.claims.email,
        })
    }
}

/// Verifies bearer tokens on user routes
#[derive(Clone)]
pub enum TokenVerifier {
    Firebase(FirebaseVerifier),
    SharedSecret(SharedSecretVerifier),
}

impl TokenVerifier {
    /// `SPENDCHECK_DEV_TOKEN_SECRET` wins; otherwise Firebase when a project
    /// id is known from `FIREBASE_PROJECT_ID` or the service-account file
    pub fn from_env() -> Option<Self> {
        if let Some(secret) = std::env::var("SPENDCHECK_DEV_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
        {
            warn!("Accepting HS256 development tokens (SPENDCHECK_DEV_TOKEN_SECRET is set)");
            return Some(TokenVerifier::SharedSecret(SharedSecretVerifier::new(&secret)));
        }

        let key = match ServiceAccountKey::from_env() {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Could not read service account for token verification");
                None
            }
        };
        project_id_from_env(key.as_ref())
            .map(|project| TokenVerifier::Firebase(FirebaseVerifier::new(&project)))
    }

    pub fn shared_secret(secret: &str) -> Self {
        TokenVerifier::SharedSecret(SharedSecretVerifier::new(secret))
    }

    pub async fn verify(&self, token: &str) -> Result<AuthUser, String> {
        match self {
            TokenVerifier::Firebase(v) => v.verify(token).await,
            TokenVerifier::SharedSecret(v) => v.verify(token),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TokenVerifier::Firebase(v) => format!("firebase ({})", v.project_id()),
            TokenVerifier::SharedSecret(_) => "shared secret (development)".to_string(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Decoded `:uid` of the matched route, the same value handlers see
async fn path_user(request: &mut Request) -> Option<String> {
    let Path(params) = request
        .extract_parts::<Path<HashMap<String, String>>>()
        .await
        .ok()?;
    params.get("uid").filter(|uid| !uid.is_empty()).cloned()
}

/// Token verification for user routes
///
/// With authentication disabled every request is admitted as the user named
/// in its path, so ownership checks pass.
pub(crate) async fn token_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        let uid = path_user(&mut request)
            .await
            .unwrap_or_else(|| LOCAL_DEV_USER.to_string());
        let user = AuthUser {
            uid,
            email: None,
        };
        request.extensions_mut().insert(user);
        return next.run(request).await;
    }

    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        warn!(path = %request.uri().path(), "Missing or malformed authorization header");
        return AppError::unauthorized("Invalid authorization header").into_response();
    };

    let Some(verifier) = &state.config.verifier else {
        return AppError::service_unavailable("Token verification not configured").into_response();
    };

    match verifier.verify(&token).await {
        Ok(user) => {
            debug!(user_id = %user.uid, path = %request.uri().path(), "Authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, path = %request.uri().path(), "Invalid token");
            AppError::unauthorized(&format!("Invalid token: {}", e)).into_response()
        }
    }
}

/// API-key check for admin routes
pub(crate) async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }
    if state.config.api_keys.is_empty() {
        return AppError::service_unavailable("Admin API not configured").into_response();
    }

    let valid = bearer_token(request.headers())
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Unauthorized admin request");
        AppError::unauthorized("Invalid API key").into_response()
    }
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}
