//! Push notifications to user devices
//!
//! # Configuration
//!
//! Environment variables:
//! - `PUSH_BACKEND`: `fcm` (default), `mock` or `disabled`
//! - `FCM_HOST`: FCM API base URL (default: https://fcm.googleapis.com)
//! - `GOOGLE_APPLICATION_CREDENTIALS`, `FIREBASE_PROJECT_ID`: FCM credentials

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::google_auth::{project_id_from_env, ServiceAccountKey, TokenSource};

pub const DEFAULT_FCM_HOST: &str = "https://fcm.googleapis.com";

/// Provider acknowledgement of a sent message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushReceipt {
    /// Provider message name/id, when reported
    pub message_id: Option<String>,
}

#[async_trait]
pub trait PushBackend: Send + Sync {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<PushReceipt>;
}

/// Firebase Cloud Messaging HTTP v1
#[derive(Clone)]
pub struct FcmBackend {
    http_client: Client,
    send_url: String,
    token: TokenSource,
}

impl FcmBackend {
    pub fn new(host: &str, project_id: &str, token: TokenSource) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                host.trim_end_matches('/'),
                project_id
            ),
            token,
        }
    }

    /// Service-account backed FCM; errors name the missing variable
    pub fn from_env() -> Result<Self> {
        let key = ServiceAccountKey::from_env()?;
        let project_id = project_id_from_env(key.as_ref())
            .ok_or(Error::NotConfigured("FIREBASE_PROJECT_ID"))?;
        let key = key.ok_or(Error::NotConfigured("GOOGLE_APPLICATION_CREDENTIALS"))?;
        let host = std::env::var("FCM_HOST").unwrap_or_else(|_| DEFAULT_FCM_HOST.to_string());
        Ok(Self::new(&host, &project_id, TokenSource::service_account(key)))
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }
}

/// FCM v1 message with Android and APNs overrides
pub fn fcm_message(token: &str, title: &str, body: &str) -> Value {
    json!({
        "message": {
            "token": token,
            "notification": {
                "title": title,
                "body": body
            },
            "android": {
                "priority": "high",
                "notification": {
                    "channel_id": "default_channel",
                    "title": title,
                    "body": body
                }
            },
            "data": {
                "full_message": body,
                "type": "transaction",
                "body": body,
                "customInfo": ""
            },
            "apns": {
                "headers": {
                    "apns-priority": "10"
                },
                "payload": {
                    "aps": {
                        "alert": {
                            "title": title,
                            "body": body
                        },
                        "mutable-content": 1,
                        "sound": "default"
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

#[async_trait]
impl PushBackend for FcmBackend {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<PushReceipt> {
        if token.trim().is_empty() {
            return Err(Error::InvalidData("FCM token is required".into()));
        }

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(self.token.token().await?)
            .json(&fcm_message(token, title, body))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "FCM",
                format!("send failed {}: {}", status, body),
            ));
        }

        let sent: FcmResponse = response.json().await?;
        debug!(message = ?sent.name, "Notification sent");
        Ok(PushReceipt {
            message_id: sent.name,
        })
    }
}

/// A message captured by `MockPush`
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// Records messages instead of sending them
#[derive(Clone, Default)]
pub struct MockPush {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: bool,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose sends always fail
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushBackend for MockPush {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<PushReceipt> {
        if self.fail {
            return Err(Error::provider("MockPush", "send failed"));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| Error::InvalidData("Failed to acquire mock push lock".into()))?;
        sent.push(SentMessage {
            token: token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(PushReceipt {
            message_id: Some(format!("mock-{}", sent.len())),
        })
    }
}

#[derive(Clone)]
pub enum PushClient {
    Fcm(FcmBackend),
    Mock(MockPush),
    /// Notifications are dropped; sends report an error
    Disabled,
}

impl PushClient {
    /// Create from `PUSH_BACKEND`; an unconfigured FCM backend disables push
    pub fn from_env() -> Self {
        let backend = std::env::var("PUSH_BACKEND").unwrap_or_else(|_| "fcm".to_string());
        match backend.to_lowercase().as_str() {
            "mock" => PushClient::Mock(MockPush::new()),
            "disabled" | "none" => PushClient::Disabled,
            other => {
                if other != "fcm" && !other.is_empty() {
                    warn!(backend = %backend, "Unknown PUSH_BACKEND, falling back to fcm");
                }
                match FcmBackend::from_env() {
                    Ok(fcm) => PushClient::Fcm(fcm),
                    Err(e) => {
                        warn!("Push notifications disabled: {}", e);
                        PushClient::Disabled
                    }
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, PushClient::Disabled)
    }

    pub fn describe(&self) -> String {
        match self {
            PushClient::Fcm(b) => format!("fcm ({})", b.send_url()),
            PushClient::Mock(_) => "mock".to_string(),
            PushClient::Disabled => "disabled".to_string(),
        }
    }
}

#[async_trait]
impl PushBackend for PushClient {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<PushReceipt> {
        match self {
            PushClient::Fcm(b) => b.send(token, title, body).await,
            PushClient::Mock(b) => b.send(token, title, body).await,
            PushClient::Disabled => Err(Error::NotConfigured("Push notifications")),
        }
    }
}
