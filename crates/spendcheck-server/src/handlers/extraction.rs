//! Receipt and voice extraction handlers

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{AppError, AppState, AuthUser};
use spendcheck_core::{extract_transaction, AIClient, OcrBackend, OcrFileType, OcrSource};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextRequest {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceTextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

fn ai_client(state: &AppState) -> Result<&AIClient, AppError> {
    state
        .ai
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("AI backend not configured"))
}

/// POST /extract-text - OCR an uploaded receipt and pre-fill a transaction
pub async fn extract_text(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ExtractTextRequest>,
) -> Result<Json<Value>, AppError> {
    let Some(file_url) = request.file_url.filter(|u| !u.trim().is_empty()) else {
        return Err(AppError::bad_request("No file URL provided"));
    };
    let file_type = OcrFileType::parse(request.file_type.as_deref().unwrap_or("image"))?;

    let ocr = state
        .ocr
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("OCR not configured"))?;
    let ai = ai_client(&state)?;

    let source = OcrSource::Url {
        url: file_url,
        file_type,
    };
    let text = match ocr.extract_text(&source).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            warn!(user_id = %user.uid, "OCR returned no text");
            return Err(AppError::bad_gateway(
                "OCR extraction failed",
                anyhow::anyhow!("no text recognised"),
            ));
        }
        Err(e) => return Err(AppError::bad_gateway("OCR extraction failed", e)),
    };

    let result = extract_transaction(ai, &text)
        .await
        .map_err(|e| AppError::bad_gateway("Extraction failed", e))?;
    info!(
        user_id = %user.uid,
        transaction_type = %result.transaction_type,
        "Extracted receipt"
    );

    Ok(Json(json!({
        "success": true,
        "transactionType": result.transaction_type,
        "amount": result.amount,
        "category": result.category,
    })))
}

/// POST /parse-voice-text - Pre-fill a transaction from dictated text
pub async fn parse_voice_text(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<VoiceTextRequest>,
) -> Result<Json<Value>, AppError> {
    let Some(text) = request.text.filter(|t| !t.trim().is_empty()) else {
        return Err(AppError::bad_request("No text provided"));
    };
    let ai = ai_client(&state)?;

    let result = extract_transaction(ai, &text)
        .await
        .map_err(|e| AppError::bad_gateway("Extraction failed", e))?;
    info!(
        user_id = %user.uid,
        transaction_type = %result.transaction_type,
        "Parsed voice text"
    );

    Ok(Json(json!({
        "success": true,
        "transaction_type": result.transaction_type,
        "amount": result.amount,
        "category": result.category,
    })))
}
