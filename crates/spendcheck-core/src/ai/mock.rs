//! Mock backend for testing
//!
//! Deterministic keyword rules for every operation; no model server needed.

use async_trait::async_trait;

use crate::analytics::{format_amount, IncomeExpenseSummary};
use crate::error::Result;

use super::parsing::parse_amount;
use super::types::{DetectedType, RouterInfo};
use super::AIBackend;

const INCOME_WORDS: &[&str] = &["salary", "received", "credited", "income", "refund", "bonus"];
const EXPENSE_WORDS: &[&str] = &[
    "paid", "bought", "spent", "receipt", "total", "expense", "purchase", "bill", "invoice",
];

const CATEGORY_WORDS: &[(&str, &[&str])] = &[
    (
        "Food & Dining",
        &["food", "lunch", "dinner", "breakfast", "restaurant", "cafe", "pizza", "grocer"],
    ),
    ("Transportation", &["uber", "taxi", "cab", "fuel", "petrol", "bus", "metro", "train"]),
    ("Housing & Utilities", &["rent", "electricity", "water", "internet", "gas bill"]),
    ("Entertainment", &["movie", "cinema", "netflix", "concert", "game"]),
    ("Health & Fitness", &["pharmacy", "doctor", "gym", "medicine", "hospital"]),
    ("Travel", &["flight", "hotel", "airline", "trip"]),
    ("Shopping", &["shopping", "clothes", "amazon", "mall"]),
    ("Education", &["tuition", "course", "books", "school"]),
];

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn detect_transaction_type(&self, text: &str) -> Result<DetectedType> {
        let text = text.to_lowercase();
        let detected = if contains_any(&text, INCOME_WORDS) {
            DetectedType::Income
        } else if contains_any(&text, EXPENSE_WORDS) {
            DetectedType::Expense
        } else {
            DetectedType::Unknown
        };
        Ok(detected)
    }

    async fn extract_total_amount(&self, text: &str) -> Result<Option<f64>> {
        // Prefer the number after the last "total", else the first number
        let lower = text.to_lowercase();
        let amount = lower
            .rfind("total")
            .and_then(|idx| parse_amount(&lower[idx..]))
            .or_else(|| parse_amount(&lower));
        Ok(amount)
    }

    async fn categorize_expense(&self, text: &str) -> Result<String> {
        let text = text.to_lowercase();
        let category = CATEGORY_WORDS
            .iter()
            .find(|(_, words)| contains_any(&text, words))
            .map(|(category, _)| *category)
            .unwrap_or("Miscellaneous");
        Ok(category.to_string())
    }

    async fn budget_tip(&self, category: &str, spent: f64, limit: f64) -> Result<String> {
        let remaining = (limit - spent).max(0.0);
        Ok(format!(
            "Keep {} spending under ₹{} for the rest of the month.",
            category,
            format_amount(remaining)
        ))
    }

    async fn spending_advice(&self, summary: &IncomeExpenseSummary) -> Result<String> {
        let top = summary
            .category_expenses
            .iter()
            .max_by(|a, b| a.1.amount.total_cmp(&b.1.amount))
            .map(|(category, _)| category.as_str());
        Ok(match top {
            Some(category) => format!("Cut back on {} first.", category),
            None => "Review your expenses for the month.".to_string(),
        })
    }

    async fn forecast_advice(
        &self,
        summary: &IncomeExpenseSummary,
        day: u32,
        days_in_month: u32,
    ) -> Result<String> {
        let projected = if day == 0 {
            summary.total_expenses
        } else {
            summary.total_expenses / f64::from(day) * f64::from(days_in_month)
        };
        Ok(format!(
            "At this pace you will spend ₹{} against ₹{} income.",
            format_amount(projected),
            format_amount(summary.total_income)
        ))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }

    fn router_info(&self) -> RouterInfo {
        RouterInfo {
            default_model: "mock".to_string(),
            fallback_model: None,
            task_models: vec![],
        }
    }
}
