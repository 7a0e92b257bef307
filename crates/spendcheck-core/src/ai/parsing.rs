//! Parsing helpers for model responses
//!
//! Models answer in free text; these functions pull out the one value each
//! prompt asks for.

use std::sync::OnceLock;

use regex::Regex;

use super::types::DetectedType;

/// Fixed expense categories offered to the categoriser
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Food & Dining",
    "Transportation",
    "Housing & Utilities",
    "Shopping",
    "Entertainment",
    "Health & Fitness",
    "Education",
    "Personal Care",
    "Travel",
    "Finance & Investment",
    "Gifts & Donations",
    "Miscellaneous",
    "custom",
];

/// Returned when the response names none of the fixed categories
pub const UNKNOWN_CATEGORY: &str = "Unknown Category";

/// Used when a model returns an empty recommendation
pub const ADVICE_FALLBACK: &str = "Consider budgeting adjustments.";

/// Longest input text sent to classification prompts, in characters
pub const MAX_PROMPT_TEXT: usize = 3000;

pub fn parse_transaction_type(response: &str) -> DetectedType {
    let answer = response.trim();
    if answer.eq_ignore_ascii_case("income") {
        DetectedType::Income
    } else if answer.eq_ignore_ascii_case("expense") {
        DetectedType::Expense
    } else {
        DetectedType::Unknown
    }
}

fn amount_regex() -> &'static Regex {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    AMOUNT.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"))
}

/// First number in the response, thousands separators removed.
///
/// `None` when the model found nothing ("None") or the number is zero.
pub fn parse_amount(response: &str) -> Option<f64> {
    let found = amount_regex().find(response)?;
    let amount: f64 = found.as_str().replace(',', "").parse().ok()?;
    (amount > 0.0).then_some(amount)
}

/// First fixed category named in the response (case-insensitive)
pub fn parse_category(response: &str) -> String {
    let answer = response.trim().to_lowercase();
    EXPENSE_CATEGORIES
        .iter()
        .find(|c| answer.contains(&c.to_lowercase()))
        .map(|c| c.to_string())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

/// Trimmed model advice, or the generic fallback when empty
pub fn parse_advice(response: &str) -> String {
    let advice = response.trim();
    if advice.is_empty() {
        ADVICE_FALLBACK.to_string()
    } else {
        advice.to_string()
    }
}

/// Truncate to `MAX_PROMPT_TEXT` characters on a char boundary
pub fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_TEXT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
