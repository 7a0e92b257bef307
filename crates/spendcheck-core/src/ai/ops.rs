//! Prompt-driven operations shared by the HTTP backends
//!
//! A backend supplies `Completion::complete`; rendering, routing, retries
//! and response parsing live here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::analytics::{category_breakdown_text, format_amount, IncomeExpenseSummary};
use crate::error::{Error, Result};
use crate::model_router::{ModelRouter, TaskType};
use crate::prompts::{PromptId, PromptLibrary, RenderedPrompt};

use super::parsing::{
    parse_advice, parse_amount, parse_category, parse_transaction_type, truncate_text,
    EXPENSE_CATEGORIES,
};
use super::types::DetectedType;

/// A backend able to answer one rendered prompt
#[async_trait]
pub(crate) trait Completion: Send + Sync {
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String>;

    fn prompts(&self) -> &RwLock<PromptLibrary>;
}

pub(crate) fn render(
    prompts: &RwLock<PromptLibrary>,
    id: PromptId,
    vars: &HashMap<&str, &str>,
) -> Result<RenderedPrompt> {
    let mut prompts = prompts
        .write()
        .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
    prompts.render(id, vars)
}

/// Router task for a rendered prompt
pub(crate) fn task_for(prompt: &RenderedPrompt) -> TaskType {
    TaskType::parse(&prompt.task_type).unwrap_or(TaskType::Classification)
}

/// Run `call` with the routed model, retrying and recording model health.
///
/// `pinned_model` bypasses model selection (single-model backends) but still
/// uses the task's timeout and retry budget.
pub(crate) async fn routed<F, Fut>(
    router: &RwLock<ModelRouter>,
    task: TaskType,
    pinned_model: Option<&str>,
    call: F,
) -> Result<String>
where
    F: Fn(String, Duration) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let (model, timeout, retries) = {
        let router = router
            .read()
            .map_err(|_| Error::InvalidData("Failed to acquire model router lock".into()))?;
        let model = pinned_model
            .map(str::to_string)
            .unwrap_or_else(|| router.model_for_task(task).to_string());
        (model, router.timeout_for_task(task), router.retries_for_task(task))
    };

    let mut last_error = None;
    for attempt in 0..=retries {
        match call(model.clone(), timeout).await {
            Ok(text) => {
                if let Ok(mut router) = router.write() {
                    router.record_success(&model);
                }
                return Ok(text);
            }
            Err(e) => {
                warn!(model = %model, task = task.as_str(), attempt, error = %e, "Model call failed");
                if let Ok(mut router) = router.write() {
                    if router.record_failure(&model) {
                        warn!(model = %model, "Model marked unhealthy");
                    }
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::InvalidData("No model attempt was made".into())))
}

pub(crate) async fn detect_transaction_type<C: Completion + ?Sized>(
    backend: &C,
    text: &str,
) -> Result<DetectedType> {
    let mut vars = HashMap::new();
    vars.insert("text", truncate_text(text));
    let prompt = render(backend.prompts(), PromptId::DetectTransactionType, &vars)?;

    let response = backend.complete(&prompt).await?;
    debug!("Transaction type response: {}", response);
    Ok(parse_transaction_type(&response))
}

pub(crate) async fn extract_total_amount<C: Completion + ?Sized>(
    backend: &C,
    text: &str,
) -> Result<Option<f64>> {
    let mut vars = HashMap::new();
    vars.insert("text", text);
    let prompt = render(backend.prompts(), PromptId::ExtractTotal, &vars)?;

    let response = backend.complete(&prompt).await?;
    debug!("Total amount response: {}", response);
    Ok(parse_amount(&response))
}

pub(crate) async fn categorize_expense<C: Completion + ?Sized>(
    backend: &C,
    text: &str,
) -> Result<String> {
    let categories = EXPENSE_CATEGORIES.join(", ");
    let mut vars = HashMap::new();
    vars.insert("categories", categories.as_str());
    vars.insert("text", truncate_text(text));
    let prompt = render(backend.prompts(), PromptId::CategorizeExpense, &vars)?;

    let response = backend.complete(&prompt).await?;
    debug!("Category response: {}", response);
    Ok(parse_category(&response))
}

pub(crate) async fn budget_tip<C: Completion + ?Sized>(
    backend: &C,
    category: &str,
    spent: f64,
    limit: f64,
) -> Result<String> {
    let spent = format_amount(spent);
    let limit = format_amount(limit);
    let mut vars = HashMap::new();
    vars.insert("category", category);
    vars.insert("spent", spent.as_str());
    vars.insert("limit", limit.as_str());
    let prompt = render(backend.prompts(), PromptId::BudgetTip, &vars)?;

    Ok(parse_advice(&backend.complete(&prompt).await?))
}

pub(crate) async fn spending_advice<C: Completion + ?Sized>(
    backend: &C,
    summary: &IncomeExpenseSummary,
) -> Result<String> {
    let income = format_amount(summary.total_income);
    let expenses = format_amount(summary.total_expenses);
    let breakdown = category_breakdown_text(summary);
    let mut vars = HashMap::new();
    vars.insert("income", income.as_str());
    vars.insert("expenses", expenses.as_str());
    vars.insert("breakdown", breakdown.as_str());
    let prompt = render(backend.prompts(), PromptId::SpendingAdvice, &vars)?;

    Ok(parse_advice(&backend.complete(&prompt).await?))
}

pub(crate) async fn forecast_advice<C: Completion + ?Sized>(
    backend: &C,
    summary: &IncomeExpenseSummary,
    day: u32,
    days_in_month: u32,
) -> Result<String> {
    let income = format_amount(summary.total_income);
    let expenses = format_amount(summary.total_expenses);
    let breakdown = category_breakdown_text(summary);
    let day = day.to_string();
    let days_in_month = days_in_month.to_string();
    let mut vars = HashMap::new();
    vars.insert("income", income.as_str());
    vars.insert("expenses", expenses.as_str());
    vars.insert("breakdown", breakdown.as_str());
    vars.insert("day", day.as_str());
    vars.insert("days_in_month", days_in_month.as_str());
    let prompt = render(backend.prompts(), PromptId::ForecastAdvice, &vars)?;

    Ok(parse_advice(&backend.complete(&prompt).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_router::RouterConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Echo {
        prompts: RwLock<PromptLibrary>,
        answer: String,
    }

    #[async_trait]
    impl Completion for Echo {
        async fn complete(&self, _prompt: &RenderedPrompt) -> Result<String> {
            Ok(self.answer.clone())
        }

        fn prompts(&self) -> &RwLock<PromptLibrary> {
            &self.prompts
        }
    }

    fn echo(answer: &str) -> Echo {
        Echo {
            prompts: RwLock::new(PromptLibrary::embedded_only()),
            answer: answer.to_string(),
        }
    }

    #[tokio::test]
    async fn test_operations_parse_responses() {
        assert_eq!(
            detect_transaction_type(&echo("Expense\n"), "Paid 200 for lunch")
                .await
                .unwrap(),
            DetectedType::Expense
        );
        assert_eq!(
            extract_total_amount(&echo("Total 1,200.50"), "receipt")
                .await
                .unwrap(),
            Some(1200.5)
        );
        assert_eq!(
            categorize_expense(&echo("Travel"), "flight").await.unwrap(),
            "Travel"
        );
        assert_eq!(
            budget_tip(&echo(""), "Food", 90.0, 100.0).await.unwrap(),
            "Consider budgeting adjustments."
        );
    }

    #[test]
    fn test_task_for_prompt() {
        let mut prompts = PromptLibrary::embedded_only();
        let vars = HashMap::new();
        let rendered = prompts.render(PromptId::ForecastAdvice, &vars).unwrap();
        assert_eq!(task_for(&rendered), TaskType::Forecast);
        let rendered = prompts.render(PromptId::ExtractTotal, &vars).unwrap();
        assert_eq!(task_for(&rendered), TaskType::Extraction);
    }

    #[tokio::test]
    async fn test_routed_retries_then_succeeds() {
        let router = RwLock::new(ModelRouter::with_config(RouterConfig {
            default_retries: 2,
            ..Default::default()
        }));
        let calls = AtomicU32::new(0);

        let result = routed(&router, TaskType::Classification, None, |model, _| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::InvalidData("busy".into()))
                } else {
                    Ok(model)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "gemini-1.5-flash");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(router.read().unwrap().is_healthy("gemini-1.5-flash"));
    }

    #[tokio::test]
    async fn test_routed_gives_up_after_retries() {
        let router = RwLock::new(ModelRouter::with_config(RouterConfig {
            default_retries: 1,
            ..Default::default()
        }));

        let result = routed(&router, TaskType::Extraction, Some("pinned"), |_, _| async {
            Err::<String, _>(Error::InvalidData("down".into()))
        })
        .await;
        assert!(result.is_err());
    }
}
