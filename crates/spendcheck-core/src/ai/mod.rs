//! Pluggable language-model backend abstraction
//!
//! # Architecture
//!
//! - `AIBackend`: the finance-assistant operations every backend provides
//! - `AIClient`: cloneable enum over the backends, dispatching statically
//! - Backend implementations: `GeminiBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (gemini, openai_compatible, openrouter, mock). Default: gemini
//! - `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_HOST`: Gemini backend
//! - `OPENAI_COMPATIBLE_HOST`, `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`:
//!   OpenAI-compatible backend (OpenRouter etc.)

mod gemini;
mod mock;
mod openai_compatible;
mod ops;
pub mod parsing;
pub mod types;

pub use gemini::{GeminiBackend, DEFAULT_GEMINI_HOST};
pub use mock::MockBackend;
pub use openai_compatible::{OpenAICompatibleBackend, DEFAULT_OPENAI_COMPATIBLE_MODEL};
pub use types::*;

use async_trait::async_trait;

use crate::analytics::IncomeExpenseSummary;
use crate::error::Result;

/// Interface shared by all model backends
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Income or Expense from receipt/voice text
    async fn detect_transaction_type(&self, text: &str) -> Result<DetectedType>;

    /// Total amount from receipt text; `None` when the model finds none
    async fn extract_total_amount(&self, text: &str) -> Result<Option<f64>>;

    /// One of the fixed expense categories, or "Unknown Category"
    async fn categorize_expense(&self, text: &str) -> Result<String>;

    /// Short tip for a category whose budget is nearly or fully spent
    async fn budget_tip(&self, category: &str, spent: f64, limit: f64) -> Result<String>;

    /// Advice when expenses approach income
    async fn spending_advice(&self, summary: &IncomeExpenseSummary) -> Result<String>;

    /// Month-end projection advice
    async fn forecast_advice(
        &self,
        summary: &IncomeExpenseSummary,
        day: u32,
        days_in_month: u32,
    ) -> Result<String>;

    /// True when the provider answers a cheap probe
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Base URL, shown in logs and `status`
    fn host(&self) -> &str;

    /// Models chosen per task
    fn router_info(&self) -> RouterInfo;
}

/// Concrete AI client enum
#[derive(Clone)]
pub enum AIClient {
    /// Google Generative Language API
    Gemini(GeminiBackend),
    /// OpenAI chat completions API (OpenRouter, vLLM, LocalAI, ...)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Offline keyword heuristics
    Mock(MockBackend),
}

impl AIClient {
    /// Backend picked by `AI_BACKEND` (default `gemini`), or None when that
    /// backend's required variables are missing
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "" => GeminiBackend::from_env().map(AIClient::Gemini),
            "openai_compatible" | "openrouter" | "openai" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(AIClient::Gemini)
            }
        }
    }

    /// Deterministic keyword-based backend
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new client with a different default model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Gemini(b) => AIClient::Gemini(b.with_model(model)),
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }

    /// Backend name (for status output)
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::Gemini(_) => "gemini",
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl AIBackend for AIClient {
    async fn detect_transaction_type(&self, text: &str) -> Result<DetectedType> {
        match self {
            AIClient::Gemini(b) => b.detect_transaction_type(text).await,
            AIClient::OpenAICompatible(b) => b.detect_transaction_type(text).await,
            AIClient::Mock(b) => b.detect_transaction_type(text).await,
        }
    }

    async fn extract_total_amount(&self, text: &str) -> Result<Option<f64>> {
        match self {
            AIClient::Gemini(b) => b.extract_total_amount(text).await,
            AIClient::OpenAICompatible(b) => b.extract_total_amount(text).await,
            AIClient::Mock(b) => b.extract_total_amount(text).await,
        }
    }

    async fn categorize_expense(&self, text: &str) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.categorize_expense(text).await,
            AIClient::OpenAICompatible(b) => b.categorize_expense(text).await,
            AIClient::Mock(b) => b.categorize_expense(text).await,
        }
    }

    async fn budget_tip(&self, category: &str, spent: f64, limit: f64) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.budget_tip(category, spent, limit).await,
            AIClient::OpenAICompatible(b) => b.budget_tip(category, spent, limit).await,
            AIClient::Mock(b) => b.budget_tip(category, spent, limit).await,
        }
    }

    async fn spending_advice(&self, summary: &IncomeExpenseSummary) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.spending_advice(summary).await,
            AIClient::OpenAICompatible(b) => b.spending_advice(summary).await,
            AIClient::Mock(b) => b.spending_advice(summary).await,
        }
    }

    async fn forecast_advice(
        &self,
        summary: &IncomeExpenseSummary,
        day: u32,
        days_in_month: u32,
    ) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.forecast_advice(summary, day, days_in_month).await,
            AIClient::OpenAICompatible(b) => {
                b.forecast_advice(summary, day, days_in_month).await
            }
            AIClient::Mock(b) => b.forecast_advice(summary, day, days_in_month).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Gemini(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }

    fn router_info(&self) -> RouterInfo {
        match self {
            AIClient::Gemini(b) => b.router_info(),
            AIClient::OpenAICompatible(b) => b.router_info(),
            AIClient::Mock(b) => b.router_info(),
        }
    }
}
