//! Monthly income and expense totals

use std::collections::BTreeMap;

use serde::Serialize;

use super::format_amount;
use crate::models::{Transaction, TransactionType};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryExpense {
    pub amount: f64,
    /// Non-empty notes of the expenses in this category
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncomeExpenseSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub category_expenses: BTreeMap<String, CategoryExpense>,
}

/// Totals for transactions dated in `month` (YYYY-MM)
pub fn income_and_expenses(transactions: &[Transaction], month: &str) -> IncomeExpenseSummary {
    let mut summary = IncomeExpenseSummary::default();

    for tx in transactions.iter().filter(|t| t.month_key() == month) {
        match tx.transaction_type {
            TransactionType::Income => summary.total_income += tx.amount,
            TransactionType::Expense => {
                summary.total_expenses += tx.amount;
                let entry = summary
                    .category_expenses
                    .entry(tx.category_or_default().to_string())
                    .or_default();
                entry.amount += tx.amount;
                if let Some(note) = tx.notes.as_deref().filter(|n| !n.is_empty()) {
                    entry.notes.push(note.to_string());
                }
            }
        }
    }

    summary
}

/// One line per category for advice prompts:
/// `- Food: ₹120 (e.g., lunch, dinner)`
pub fn category_breakdown_text(summary: &IncomeExpenseSummary) -> String {
    summary
        .category_expenses
        .iter()
        .map(|(category, details)| {
            let mut line = format!("- {}: ₹{}", category, format_amount(details.amount));
            if !details.notes.is_empty() {
                line.push_str(&format!(" (e.g., {})", details.notes.join(", ")));
            }
            line.push('\n');
            line
        })
        .collect()
}
