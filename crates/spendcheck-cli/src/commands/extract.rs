//! Extraction command

use anyhow::{anyhow, Context, Result};
use spendcheck_core::{
    extract_from_document, extract_transaction, AIClient, ExtractionResult, OcrBackend,
    OcrClient, OcrFileType, OcrSource,
};

/// What to extract from
#[derive(Debug, Clone)]
pub enum ExtractInput {
    Text(String),
    Url {
        url: String,
        file_type: Option<String>,
    },
}

pub async fn cmd_extract(input: ExtractInput) -> Result<()> {
    let ai = AIClient::from_env()
        .context("AI backend not configured (set GEMINI_API_KEY or AI_BACKEND)")?;
    let ocr = OcrClient::from_env();

    if let ExtractInput::Url { url, .. } = &input {
        println!("🔍 Running OCR on {}...", url);
    }
    let result = run_extract(&ai, ocr.as_ref(), input).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn run_extract<O: OcrBackend>(
    ai: &AIClient,
    ocr: Option<&O>,
    input: ExtractInput,
) -> Result<ExtractionResult> {
    match input {
        ExtractInput::Text(text) => {
            if text.trim().is_empty() {
                return Err(anyhow!("No text provided"));
            }
            Ok(extract_transaction(ai, &text).await?)
        }
        ExtractInput::Url { url, file_type } => {
            let ocr = ocr.context("OCR not configured (set OCR_SPACE_API_KEY)")?;
            let file_type = OcrFileType::parse(file_type.as_deref().unwrap_or("image"))?;
            let source = OcrSource::Url { url, file_type };
            extract_from_document(ocr, ai, &source)
                .await?
                .ok_or_else(|| anyhow!("OCR found no text in the document"))
        }
    }
}
