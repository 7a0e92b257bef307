//! Data models for SpendCheck

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether money came in or went out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

/// Receipt or bill attached to a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A stored transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Document id, assigned by the store
    pub id: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
    /// Only set for expenses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Only set for expenses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill: Option<Bill>,
}

impl Transaction {
    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }

    pub fn is_income(&self) -> bool {
        self.transaction_type == TransactionType::Income
    }

    /// Category used for grouping; falls back to "Uncategorized"
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }

    /// Calendar month key (YYYY-MM)
    pub fn month_key(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}

/// Label used when a transaction carries no category
pub const UNCATEGORIZED: &str = "Uncategorized";

/// An amount as sent by clients: either a JSON number or a numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountValue {
    Number(f64),
    Text(String),
}

impl AmountValue {
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Bill reference sent with a new or updated transaction
#[derive(Debug, Clone, Deserialize)]
pub struct BillInput {
    pub url: String,
}

/// Request body for creating a transaction
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub amount: Option<AmountValue>,
    pub transaction_type: Option<String>,
    pub category: Option<String>,
    /// ISO-8601 timestamp; defaults to now
    pub date: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub bill: Option<BillInput>,
}

impl NewTransaction {
    /// Validate the request and build the record to store.
    ///
    /// The returned transaction has an empty id; the store assigns one.
    pub fn into_transaction(self, now: DateTime<Utc>) -> Result<Transaction> {
        let (amount, type_str) = match (&self.amount, self.transaction_type.as_deref()) {
            (Some(amount), Some(t)) if !t.trim().is_empty() => (amount, t),
            _ => {
                return Err(Error::InvalidData(
                    "Missing required fields: amount and transactionType".into(),
                ))
            }
        };

        let amount = amount
            .to_f64()
            .ok_or_else(|| Error::InvalidData("Invalid amount".into()))?;
        let transaction_type: TransactionType =
            type_str.parse().map_err(|e: String| Error::InvalidData(e))?;

        let category = non_empty(self.category);
        if transaction_type == TransactionType::Expense && category.is_none() {
            return Err(Error::InvalidData(
                "Missing category for Expense transactions".into(),
            ));
        }

        let date = match self.date.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => parse_iso_datetime(s)
                .ok_or_else(|| Error::InvalidData("Invalid date format".into()))?,
            _ => now,
        };

        let is_expense = transaction_type == TransactionType::Expense;
        Ok(Transaction {
            id: String::new(),
            amount,
            transaction_type,
            category: if is_expense { category } else { None },
            date,
            created_at: now,
            notes: non_empty(self.notes),
            payment_method: if is_expense {
                non_empty(self.payment_method)
            } else {
                None
            },
            bill: self.bill.map(|b| Bill {
                url: b.url,
                uploaded_at: now,
            }),
        })
    }
}

/// Partial update for an existing transaction
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub amount: Option<AmountValue>,
    pub transaction_type: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub bill: Option<BillInput>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.transaction_type.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.notes.is_none()
            && self.payment_method.is_none()
            && self.bill.is_none()
    }

    /// Apply the update, re-checking the same rules as creation
    pub fn apply(self, tx: &mut Transaction, now: DateTime<Utc>) -> Result<()> {
        if let Some(amount) = self.amount {
            tx.amount = amount
                .to_f64()
                .ok_or_else(|| Error::InvalidData("Invalid amount".into()))?;
        }
        if let Some(t) = self.transaction_type {
            tx.transaction_type = t.parse().map_err(|e: String| Error::InvalidData(e))?;
        }
        if let Some(category) = self.category {
            tx.category = non_empty(Some(category));
        }
        if let Some(date) = self.date {
            tx.date = parse_iso_datetime(date.trim())
                .ok_or_else(|| Error::InvalidData("Invalid date format".into()))?;
        }
        if let Some(notes) = self.notes {
            tx.notes = non_empty(Some(notes));
        }
        if let Some(method) = self.payment_method {
            tx.payment_method = non_empty(Some(method));
        }
        if let Some(bill) = self.bill {
            tx.bill = Some(Bill {
                url: bill.url,
                uploaded_at: now,
            });
        }

        match tx.transaction_type {
            TransactionType::Expense if tx.category.is_none() => Err(Error::InvalidData(
                "Missing category for Expense transactions".into(),
            )),
            TransactionType::Income => {
                tx.category = None;
                tx.payment_method = None;
                Ok(())
            }
            TransactionType::Expense => Ok(()),
        }
    }
}

/// Filters for listing transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub category: Option<String>,
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            category: None,
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Budget limits for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBudget {
    /// YYYY-MM
    pub month: String,
    /// Category -> limit as sent by the client
    pub budgets: BTreeMap<String, serde_json::Value>,
}

impl MonthlyBudget {
    /// Numeric limit for a category.
    ///
    /// Non-negative whole numbers and digit-only strings count; anything else is 0.
    pub fn limit_for(&self, category: &str) -> f64 {
        self.budgets.get(category).map(limit_value).unwrap_or(0.0)
    }

    /// All limits resolved to numbers
    pub fn limits(&self) -> BTreeMap<String, f64> {
        self.budgets
            .iter()
            .map(|(k, v)| (k.clone(), limit_value(v)))
            .collect()
    }
}

fn limit_value(value: &serde_json::Value) -> f64 {
    let n = match value {
        // Whole-valued doubles count too; stores may hand integers back as floats
        serde_json::Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(whole), _) => whole as f64,
            (None, Some(f)) if f.fract() == 0.0 => f,
            _ => 0.0,
        },
        serde_json::Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                s.parse::<f64>().unwrap_or(0.0)
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    if n.is_finite() && n >= 0.0 {
        n
    } else {
        0.0
    }
}

/// A user document as the jobs see it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}

/// Validate a YYYY-MM month key
pub fn parse_month_key(month: &str) -> Option<(i32, u32)> {
    let (year, mon) = month.split_once('-')?;
    if year.len() != 4 || mon.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let mon: u32 = mon.parse().ok()?;
    (1..=12).contains(&mon).then_some((year, mon))
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`Z` or offset), naive date-times (read as UTC) and
/// bare dates (midnight UTC).
pub fn parse_iso_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_expense_requires_category() {
        let req = NewTransaction {
            amount: Some(AmountValue::Number(12.5)),
            transaction_type: Some("Expense".into()),
            ..Default::default()
        };
        let err = req.into_transaction(now()).unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing category for Expense transactions"));
    }

    #[test]
    fn test_new_transaction_missing_fields() {
        let req = NewTransaction {
            amount: Some(AmountValue::Number(1.0)),
            ..Default::default()
        };
        let err = req.into_transaction(now()).unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing required fields: amount and transactionType"));
    }

    #[test]
    fn test_income_drops_expense_only_fields() {
        let req = NewTransaction {
            amount: Some(AmountValue::Text("2500".into())),
            transaction_type: Some("Income".into()),
            category: Some("Salary".into()),
            payment_method: Some("UPI".into()),
            notes: Some("March pay".into()),
            ..Default::default()
        };
        let tx = req.into_transaction(now()).unwrap();
        assert_eq!(tx.amount, 2500.0);
        assert_eq!(tx.category, None);
        assert_eq!(tx.payment_method, None);
        assert_eq!(tx.notes.as_deref(), Some("March pay"));
        assert_eq!(tx.date, now());
    }

    #[test]
    fn test_date_parsing_variants() {
        let z = parse_iso_datetime("2025-01-15T10:30:00Z").unwrap();
        let offset = parse_iso_datetime("2025-01-15T16:00:00+05:30").unwrap();
        assert_eq!(z, offset);
        assert!(parse_iso_datetime("2025-01-15T10:30:00.123").is_some());
        assert_eq!(
            parse_iso_datetime("2025-01-15").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()
        );
        assert!(parse_iso_datetime("15/01/2025").is_none());
    }

    #[test]
    fn test_invalid_date_rejected() {
        let req = NewTransaction {
            amount: Some(AmountValue::Number(5.0)),
            transaction_type: Some("Expense".into()),
            category: Some("Shopping".into()),
            date: Some("yesterday".into()),
            ..Default::default()
        };
        let err = req.into_transaction(now()).unwrap_err();
        assert!(err.to_string().contains("Invalid date format"));
    }

    #[test]
    fn test_update_to_income_clears_category() {
        let mut tx = NewTransaction {
            amount: Some(AmountValue::Number(40.0)),
            transaction_type: Some("Expense".into()),
            category: Some("Travel".into()),
            ..Default::default()
        }
        .into_transaction(now())
        .unwrap();

        TransactionUpdate {
            transaction_type: Some("Income".into()),
            ..Default::default()
        }
        .apply(&mut tx, now())
        .unwrap();

        assert!(tx.is_income());
        assert_eq!(tx.category, None);
    }

    #[test]
    fn test_budget_limits() {
        let budget: MonthlyBudget = serde_json::from_value(serde_json::json!({
            "month": "2025-03",
            "budgets": {
                "Food": 5000, "Travel": "1200", "Shopping": "lots", "Gifts": -5, "Rent": "12.5",
                "Books": 12.5, "Fuel": 800.0
            }
        }))
        .unwrap();
        assert_eq!(budget.limit_for("Food"), 5000.0);
        assert_eq!(budget.limit_for("Travel"), 1200.0);
        assert_eq!(budget.limit_for("Shopping"), 0.0);
        assert_eq!(budget.limit_for("Gifts"), 0.0);
        assert_eq!(budget.limit_for("Books"), 0.0);
        assert_eq!(budget.limit_for("Fuel"), 800.0);
        assert_eq!(budget.limit_for("Rent"), 0.0);
        assert_eq!(budget.limit_for("Missing"), 0.0);
    }

    #[test]
    fn test_parse_month_key() {
        assert_eq!(parse_month_key("2025-03"), Some((2025, 3)));
        assert_eq!(parse_month_key("2025-13"), None);
        assert_eq!(parse_month_key("March"), None);
    }
}
