//! Conversions between domain records and document fields

use std::collections::BTreeMap;

use crate::models::{Bill, MonthlyBudget, Transaction, TransactionType};
use crate::store::{Document, FieldValue, Fields};

pub(crate) fn transaction_to_fields(tx: &Transaction) -> Fields {
    let mut fields = Fields::new();
    fields.insert("amount".into(), FieldValue::Double(tx.amount));
    fields.insert(
        "transactionType".into(),
        FieldValue::from(tx.transaction_type.as_str()),
    );
    fields.insert("date".into(), FieldValue::Timestamp(tx.date));
    fields.insert("createdAt".into(), FieldValue::Timestamp(tx.created_at));

    if let Some(category) = &tx.category {
        fields.insert("category".into(), FieldValue::from(category.as_str()));
    }
    if let Some(notes) = &tx.notes {
        fields.insert("notes".into(), FieldValue::from(notes.as_str()));
    }
    if let Some(method) = &tx.payment_method {
        fields.insert("paymentMethod".into(), FieldValue::from(method.as_str()));
    }
    if let Some(bill) = &tx.bill {
        let mut bill_fields = Fields::new();
        bill_fields.insert("url".into(), FieldValue::from(bill.url.as_str()));
        bill_fields.insert("uploadedAt".into(), FieldValue::Timestamp(bill.uploaded_at));
        fields.insert("bill".into(), FieldValue::Map(bill_fields));
    }
    fields
}

/// Decode a transaction document.
///
/// Returns `None` for documents without a numeric amount, a known type or a
/// timestamp date; such documents are ignored by listings and analytics.
pub(crate) fn transaction_from_document(doc: &Document) -> Option<Transaction> {
    let amount = match doc.get("amount")? {
        FieldValue::String(s) => s.trim().parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    let transaction_type: TransactionType = doc.get_str("transactionType")?.parse().ok()?;
    let date = doc.get("date")?.as_timestamp()?;
    let created_at = doc
        .get("createdAt")
        .and_then(FieldValue::as_timestamp)
        .unwrap_or(date);

    let bill = doc.get("bill").and_then(FieldValue::as_map).and_then(|b| {
        let url = b.get("url")?.as_str()?.to_string();
        let uploaded_at = b
            .get("uploadedAt")
            .and_then(FieldValue::as_timestamp)
            .unwrap_or(created_at);
        Some(Bill { url, uploaded_at })
    });

    Some(Transaction {
        id: doc.id.clone(),
        amount,
        transaction_type,
        category: doc.get_str("category").map(str::to_string),
        date,
        created_at,
        notes: doc.get_str("notes").map(str::to_string),
        payment_method: doc.get_str("paymentMethod").map(str::to_string),
        bill,
    })
}

pub(crate) fn budget_to_fields(month: &str, budgets: &BTreeMap<String, serde_json::Value>) -> Fields {
    let mut limits = Fields::new();
    for (category, limit) in budgets {
        limits.insert(category.clone(), FieldValue::from(limit));
    }
    let mut fields = Fields::new();
    fields.insert("month".into(), FieldValue::from(month));
    fields.insert("budgets".into(), FieldValue::Map(limits));
    fields
}

pub(crate) fn budget_from_document(doc: &Document) -> MonthlyBudget {
    let budgets = doc
        .get("budgets")
        .and_then(FieldValue::as_map)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
        .unwrap_or_default();
    MonthlyBudget {
        month: doc.get_str("month").unwrap_or(&doc.id).to_string(),
        budgets,
    }
}
