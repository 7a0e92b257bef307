//! Gemini backend implementation
//!
//! Calls the Generative Language API `generateContent` endpoint.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY`: API key (required)
//! - `GEMINI_MODEL`: Model name (default: models.toml `defaults.model`)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::analytics::IncomeExpenseSummary;
use crate::error::{Error, Result};
use crate::model_router::{ModelRouter, TaskType};
use crate::prompts::{PromptLibrary, RenderedPrompt};

use super::ops::{self, Completion};
use super::types::{DetectedType, RouterInfo};
use super::AIBackend;

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";

/// Gemini backend with task-based model routing
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    host: String,
    api_key: String,
    model: String,
    router: Arc<RwLock<ModelRouter>>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl GeminiBackend {
    /// Backend using the routed default model
    pub fn new(host: &str, api_key: &str) -> Self {
        let router = ModelRouter::new().unwrap_or_default();
        let model = router.config().default_model.clone();
        Self::with_router(host, api_key, &model, router)
    }

    /// Backend with an explicit default model
    pub fn with_default_model(host: &str, api_key: &str, model: &str) -> Self {
        let mut router = ModelRouter::new().unwrap_or_default();
        router.set_default_model(model);
        Self::with_router(host, api_key, model, router)
    }

    pub fn with_router(host: &str, api_key: &str, model: &str, router: ModelRouter) -> Self {
        Self {
            http_client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            router: Arc::new(RwLock::new(router)),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Create a new instance with a different default model
    pub fn with_model(&self, model: &str) -> Self {
        let mut router = ModelRouter::with_config(self.router_config());
        router.set_default_model(model);
        Self {
            http_client: self.http_client.clone(),
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            model: model.to_string(),
            router: Arc::new(RwLock::new(router)),
            prompts: self.prompts.clone(),
        }
    }

    /// Create from environment variables
    ///
    /// Required: `GEMINI_API_KEY`
    /// Optional: `GEMINI_MODEL`, `GEMINI_HOST`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let host =
            std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_GEMINI_HOST.to_string());

        match std::env::var("GEMINI_MODEL").ok().filter(|m| !m.is_empty()) {
            Some(model) => Some(Self::with_default_model(&host, &api_key, &model)),
            None => Some(Self::new(&host, &api_key)),
        }
    }

    fn router_config(&self) -> crate::model_router::RouterConfig {
        self.router
            .read()
            .map(|r| r.config().clone())
            .unwrap_or_default()
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &RenderedPrompt,
        timeout: Duration,
    ) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.user.clone(),
                }],
            }],
            system_instruction: prompt.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: system.clone(),
                }],
            }),
            generation_config: GenerationConfig { temperature: 0.2 },
        };

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.host, model
            ))
            .query(&[("key", self.api_key.as_str())])
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "Gemini",
                format!("API error {}: {}", status, body),
            ));
        }

        let generated: GenerateContentResponse = response.json().await?;
        generated
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default()
            })
            .ok_or_else(|| Error::provider("Gemini", "No candidates in response"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[async_trait]
impl Completion for GeminiBackend {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        ops::routed(&self.router, ops::task_for(prompt), None, |model, timeout| async move {
            self.generate(&model, prompt, timeout).await
        })
        .await
    }

    fn prompts(&self) -> &RwLock<PromptLibrary> {
        &self.prompts
    }
}

#[async_trait]
impl AIBackend for GeminiBackend {
    async fn detect_transaction_type(&self, text: &str) -> Result<DetectedType> {
        ops::detect_transaction_type(self, text).await
    }

    async fn extract_total_amount(&self, text: &str) -> Result<Option<f64>> {
        ops::extract_total_amount(self, text).await
    }

    async fn categorize_expense(&self, text: &str) -> Result<String> {
        ops::categorize_expense(self, text).await
    }

    async fn budget_tip(&self, category: &str, spent: f64, limit: f64) -> Result<String> {
        ops::budget_tip(self, category, spent, limit).await
    }

    async fn spending_advice(&self, summary: &IncomeExpenseSummary) -> Result<String> {
        ops::spending_advice(self, summary).await
    }

    async fn forecast_advice(
        &self,
        summary: &IncomeExpenseSummary,
        day: u32,
        days_in_month: u32,
    ) -> Result<String> {
        ops::forecast_advice(self, summary, day, days_in_month).await
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/v1beta/models", self.host))
            .query(&[("key", self.api_key.as_str())])
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn router_info(&self) -> RouterInfo {
        let config = self.router_config();
        let task_models = TaskType::all()
            .iter()
            .filter_map(|task| {
                config
                    .tasks
                    .get(task)
                    .and_then(|t| t.model.clone())
                    .filter(|m| *m != config.default_model)
                    .map(|m| (task.as_str().to_string(), m))
            })
            .collect();

        RouterInfo {
            default_model: config.default_model,
            fallback_model: config.fallback_model,
            task_models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_router::RouterConfig;

    fn backend(host: &str) -> GeminiBackend {
        GeminiBackend::with_router(
            host,
            "test-key",
            "gemini-1.5-flash",
            ModelRouter::with_config(RouterConfig::default()),
        )
        .with_prompts(PromptLibrary::embedded_only())
    }

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = backend("http://localhost:9999/");
        assert_eq!(backend.host(), "http://localhost:9999");
        assert_eq!(backend.model(), "gemini-1.5-flash");
    }

    #[test]
    fn test_with_model_changes_default() {
        let backend = backend("http://localhost:9999").with_model("gemini-1.5-pro");
        assert_eq!(backend.model(), "gemini-1.5-pro");
        assert_eq!(backend.router_info().default_model, "gemini-1.5-pro");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: "Hello".into(),
                }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: "Be brief".into(),
                }],
            }),
            generation_config: GenerationConfig { temperature: 0.2 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief");
        assert!(json["systemInstruction"].get("role").is_none());
        assert!(json["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_response_without_text_parts() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(response.candidates[0].content.is_none());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        assert!(!backend("http://127.0.0.1:1").health_check().await);
    }
}
