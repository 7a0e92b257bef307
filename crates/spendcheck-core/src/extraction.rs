//! Transaction details from receipt or voice text

use serde::Serialize;

use crate::ai::{AIBackend, DetectedType};
use crate::error::Result;
use crate::ocr::{OcrBackend, OcrSource};

/// Fields pre-filled for a new transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub transaction_type: DetectedType,
    /// `None` when no total was found
    pub amount: Option<f64>,
    /// Only set for expenses
    pub category: Option<String>,
}

/// Detect type and total, and categorise expenses
pub async fn extract_transaction<A: AIBackend + ?Sized>(
    ai: &A,
    text: &str,
) -> Result<ExtractionResult> {
    let transaction_type = ai.detect_transaction_type(text).await?;
    let amount = ai.extract_total_amount(text).await?;
    let category = match transaction_type {
        DetectedType::Expense => Some(ai.categorize_expense(text).await?),
        _ => None,
    };

    tracing::debug!(
        transaction_type = %transaction_type,
        amount = ?amount,
        category = ?category,
        "Extracted transaction"
    );

    Ok(ExtractionResult {
        transaction_type,
        amount,
        category,
    })
}

/// OCR a receipt, then extract. `Ok(None)` when OCR found no text.
pub async fn extract_from_document<O, A>(
    ocr: &O,
    ai: &A,
    source: &OcrSource,
) -> Result<Option<ExtractionResult>>
where
    O: OcrBackend + ?Sized,
    A: AIBackend + ?Sized,
{
    match ocr.extract_text(source).await? {
        Some(text) => extract_transaction(ai, &text).await.map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AIClient;
    use crate::ocr::{MockOcr, OcrFileType};

    #[tokio::test]
    async fn test_expense_gets_category() {
        let result = extract_transaction(&AIClient::mock(), "Paid for dinner at cafe, total 450")
            .await
            .unwrap();
        assert_eq!(result.transaction_type, DetectedType::Expense);
        assert_eq!(result.amount, Some(450.0));
        assert_eq!(result.category.as_deref(), Some("Food & Dining"));
    }

    #[tokio::test]
    async fn test_income_has_no_category() {
        let result = extract_transaction(&AIClient::mock(), "Salary credited 50000")
            .await
            .unwrap();
        assert_eq!(result.transaction_type, DetectedType::Income);
        assert_eq!(result.amount, Some(50000.0));
        assert!(result.category.is_none());
    }

    #[tokio::test]
    async fn test_document_without_text() {
        let source = OcrSource::Url {
            url: "https://files/r.png".into(),
            file_type: OcrFileType::Png,
        };
        let result = extract_from_document(&MockOcr::empty(), &AIClient::mock(), &source)
            .await
            .unwrap();
        assert!(result.is_none());

        let result = extract_from_document(
            &MockOcr::with_text("Uber receipt\nTotal 320"),
            &AIClient::mock(),
            &source,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.category.as_deref(), Some("Transportation"));
        assert_eq!(result.amount, Some(320.0));
    }
}
