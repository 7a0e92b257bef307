//! Category and month aggregations for the analytics endpoints
//!
//! Positive amounts count as spending regardless of transaction type.

use std::collections::BTreeMap;

use serde::Serialize;

use super::round2;
use crate::models::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAmount {
    pub category: String,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub categories: Vec<CategoryAmount>,
    pub total_spent: f64,
}

/// Spending per category, largest first
pub fn category_breakdown(transactions: &[Transaction]) -> CategoryBreakdown {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total_spent = 0.0;

    for tx in transactions.iter().filter(|t| t.amount > 0.0) {
        *totals.entry(tx.category_or_default()).or_default() += tx.amount;
        total_spent += tx.amount;
    }

    let mut categories: Vec<CategoryAmount> = totals
        .into_iter()
        .map(|(category, amount)| CategoryAmount {
            category: category.to_string(),
            amount,
            percentage: if total_spent > 0.0 {
                round2(amount / total_spent * 100.0)
            } else {
                0.0
            },
        })
        .collect();
    categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));

    CategoryBreakdown {
        categories,
        total_spent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTrend {
    /// Display label, e.g. "Jan 2025"
    pub month: String,
    /// YYYY-MM
    pub key: String,
    pub total: f64,
    pub categories: BTreeMap<String, f64>,
    /// Change from the previous month; absent on the first month
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub months: Vec<MonthTrend>,
}

/// Spending per calendar month in chronological order
pub fn monthly_trend(transactions: &[Transaction]) -> MonthlyTrend {
    let mut by_month: BTreeMap<String, MonthTrend> = BTreeMap::new();

    for tx in transactions {
        let key = tx.month_key();
        let entry = by_month.entry(key.clone()).or_insert_with(|| MonthTrend {
            month: tx.date.format("%b %Y").to_string(),
            key,
            total: 0.0,
            categories: BTreeMap::new(),
            change_percentage: None,
        });

        if tx.amount > 0.0 {
            entry.total += tx.amount;
            *entry
                .categories
                .entry(tx.category_or_default().to_string())
                .or_default() += tx.amount;
        }
    }

    let mut months: Vec<MonthTrend> = by_month.into_values().collect();
    for i in 1..months.len() {
        let previous = months[i - 1].total;
        let current = months[i].total;
        months[i].change_percentage = Some(if previous > 0.0 {
            round2((current - previous) / previous * 100.0)
        } else {
            0.0
        });
    }

    MonthlyTrend { months }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisTransaction {
    /// YYYY-MM-DD
    pub date: String,
    pub amount: f64,
    pub category: String,
    /// YYYY-MM
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    pub total: f64,
    pub raw_month: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAnalysis {
    pub transactions: Vec<AnalysisTransaction>,
    pub category_summary: BTreeMap<String, f64>,
    pub monthly_summary: Vec<MonthSummary>,
}

/// Flattened spending rows plus per-category and per-month totals
pub fn monthly_analysis(transactions: &[Transaction]) -> MonthlyAnalysis {
    let mut rows = Vec::new();
    let mut category_summary: BTreeMap<String, f64> = BTreeMap::new();
    let mut monthly: BTreeMap<String, MonthSummary> = BTreeMap::new();

    for tx in transactions.iter().filter(|t| t.amount > 0.0) {
        let month = tx.month_key();
        let category = tx.category_or_default().to_string();

        monthly
            .entry(month.clone())
            .or_insert_with(|| MonthSummary {
                month: tx.date.format("%b %Y").to_string(),
                total: 0.0,
                raw_month: month.clone(),
            })
            .total += tx.amount;

        *category_summary.entry(category.clone()).or_default() += tx.amount;

        rows.push(AnalysisTransaction {
            date: tx.date.format("%Y-%m-%d").to_string(),
            amount: tx.amount,
            category,
            month,
        });
    }

    MonthlyAnalysis {
        transactions: rows,
        category_summary,
        monthly_summary: monthly.into_values().collect(),
    }
}
