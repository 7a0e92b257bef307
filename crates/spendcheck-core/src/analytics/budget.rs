//! Budget vs spending

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::models::{MonthlyBudget, Transaction};

/// Budget document and per-category expense totals for one month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    /// Serialized as the stored document, or `{}` when none exists
    #[serde(rename = "budgets", serialize_with = "budget_or_empty")]
    pub budget: Option<MonthlyBudget>,
    pub spent: BTreeMap<String, f64>,
}

fn budget_or_empty<S: Serializer>(
    budget: &Option<MonthlyBudget>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match budget {
        Some(budget) => budget.serialize(serializer),
        None => serde_json::Map::new().serialize(serializer),
    }
}

/// Sum `Expense` transactions dated in `month` (YYYY-MM) per category
pub fn budget_summary(
    budget: Option<MonthlyBudget>,
    transactions: &[Transaction],
    month: &str,
) -> BudgetSummary {
    let mut spent: BTreeMap<String, f64> = BTreeMap::new();
    for tx in transactions
        .iter()
        .filter(|t| t.is_expense() && t.month_key() == month)
    {
        *spent
            .entry(tx.category_or_default().to_string())
            .or_default() += tx.amount;
    }
    BudgetSummary { budget, spent }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    /// 90% to just under 100% of the limit
    Warning,
    /// Over the limit
    Exceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetAlert {
    pub category: String,
    pub spent: f64,
    pub limit: f64,
    pub percentage: f64,
    pub level: AlertLevel,
}

/// Categories that crossed a budget threshold.
///
/// Categories without a positive limit are skipped. Spending exactly at the
/// limit raises nothing.
pub fn budget_alerts(summary: &BudgetSummary) -> Vec<BudgetAlert> {
    let Some(budget) = &summary.budget else {
        return Vec::new();
    };

    summary
        .spent
        .iter()
        .filter_map(|(category, &spent)| {
            let limit = budget.limit_for(category);
            if limit <= 0.0 {
                return None;
            }
            let percentage = spent / limit * 100.0;
            let level = if (90.0..100.0).contains(&percentage) {
                AlertLevel::Warning
            } else if spent > limit {
                AlertLevel::Exceeded
            } else {
                return None;
            };
            Some(BudgetAlert {
                category: category.clone(),
                spent,
                limit,
                percentage,
                level,
            })
        })
        .collect()
}
