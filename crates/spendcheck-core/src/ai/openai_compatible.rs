//! Chat-completions backend (OpenRouter and other OpenAI-style servers)
//!
//! `OPENAI_COMPATIBLE_HOST` is required. `OPENAI_COMPATIBLE_MODEL` defaults to
//! a free OpenRouter model and `OPENAI_COMPATIBLE_API_KEY` is sent as a bearer
//! token when set.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::analytics::IncomeExpenseSummary;
use crate::error::{Error, Result};
use crate::model_router::ModelRouter;
use crate::prompts::{PromptLibrary, RenderedPrompt};

use super::ops::{self, Completion};
use super::types::{DetectedType, RouterInfo};
use super::AIBackend;

pub const DEFAULT_OPENAI_COMPATIBLE_MODEL: &str = "google/gemma-3-12b-it:free";

const PROVIDER: &str = "OpenAI-compatible";

/// One pinned model for every task; the router only supplies timeouts,
/// retries and health bookkeeping.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    router: Arc<RwLock<ModelRouter>>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let mut router = ModelRouter::default();
        router.set_default_model(model);
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            router: Arc::new(RwLock::new(router)),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST")
            .ok()
            .filter(|h| !h.is_empty())?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_COMPATIBLE_MODEL.to_string());
        Some(Self::new(
            &host,
            &model,
            std::env::var("OPENAI_COMPATIBLE_API_KEY").ok(),
        ))
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Same server and credentials, different model
    pub fn with_model(&self, model: &str) -> Self {
        let mut other = self.clone();
        other.model = model.to_string();
        other
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn chat(&self, prompt: &RenderedPrompt, timeout: Duration) -> Result<String> {
        let messages = prompt
            .system
            .as_deref()
            .map(|system| Message {
                role: "system",
                content: system,
            })
            .into_iter()
            .chain(std::iter::once(Message {
                role: "user",
                content: &prompt.user,
            }))
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
            stream: false,
        };

        let response = self
            .authorized(
                self.http_client
                    .post(format!("{}/v1/chat/completions", self.base_url)),
            )
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::provider(PROVIDER, format!("{}: {}", status, detail)));
        }

        let reply: ChatReply = response.json().await?;
        match reply.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.unwrap_or_default()),
            None => Err(Error::provider(PROVIDER, "response had no choices")),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Completion for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        ops::routed(
            &self.router,
            ops::task_for(prompt),
            Some(&self.model),
            |_, timeout| async move { self.chat(prompt, timeout).await },
        )
        .await
    }

    fn prompts(&self) -> &RwLock<PromptLibrary> {
        &self.prompts
    }
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
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

    /// `GET /v1/models`, then `/health` for self-hosted servers
    async fn health_check(&self) -> bool {
        for path in ["/v1/models", "/health"] {
            let request = self.authorized(
                self.http_client
                    .get(format!("{}{}", self.base_url, path))
                    .timeout(Duration::from_secs(5)),
            );
            if matches!(request.send().await, Ok(resp) if resp.status().is_success()) {
                return true;
            }
        }
        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn router_info(&self) -> RouterInfo {
        RouterInfo {
            default_model: self.model.clone(),
            fallback_model: None,
            task_models: vec![],
        }
    }
}
