//! OCR provider for receipt images and PDFs
//!
//! # Configuration
//!
//! Environment variables:
//! - `OCR_BACKEND`: `ocrspace` (default) or `mock`
//! - `OCR_SPACE_API_KEY`: API key (required for ocrspace)
//! - `OCR_SPACE_HOST`: API base URL (default: https://api.ocr.space)

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_OCR_SPACE_HOST: &str = "https://api.ocr.space";

/// File type hint sent to the OCR provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrFileType {
    Png,
    Jpg,
    Pdf,
    /// Let the provider detect the type
    Auto,
}

impl OcrFileType {
    /// Parse an extension or a free-form `fileType` value.
    ///
    /// `png`, `jpg`, `jpeg` and `pdf` map to their types; `image` and empty
    /// mean auto-detect; anything else is rejected.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().trim_start_matches('.').to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "pdf" => Ok(Self::Pdf),
            "image" | "" => Ok(Self::Auto),
            other => Err(Error::InvalidData(format!("Unsupported file type: {}", other))),
        }
    }

    /// Type implied by a file name's extension
    pub fn from_file_name(name: &str) -> Result<Self> {
        match name.rsplit_once('.') {
            Some((_, ext)) => Self::parse(ext),
            None => Err(Error::InvalidData(format!("Unsupported file type: {}", name))),
        }
    }

    /// Value of the `filetype` form field; `None` for auto-detect
    pub fn as_form_value(&self) -> Option<&'static str> {
        match self {
            Self::Png => Some("PNG"),
            Self::Jpg => Some("JPG"),
            Self::Pdf => Some("PDF"),
            Self::Auto => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg | Self::Auto => "image/jpeg",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Where the OCR provider reads the document from
#[derive(Debug, Clone)]
pub enum OcrSource {
    /// Publicly reachable file URL
    Url { url: String, file_type: OcrFileType },
    /// Inline file contents
    Bytes { data: Vec<u8>, file_type: OcrFileType },
}

impl OcrSource {
    pub fn file_type(&self) -> OcrFileType {
        match self {
            Self::Url { file_type, .. } | Self::Bytes { file_type, .. } => *file_type,
        }
    }
}

#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Recognised text, or `None` when the provider found nothing
    async fn extract_text(&self, source: &OcrSource) -> Result<Option<String>>;
}

/// OCR.space `parse/image` API
#[derive(Clone)]
pub struct OcrSpaceBackend {
    http_client: Client,
    host: String,
    api_key: String,
}

impl OcrSpaceBackend {
    pub fn new(host: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Required: `OCR_SPACE_API_KEY`; optional: `OCR_SPACE_HOST`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OCR_SPACE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let host = std::env::var("OCR_SPACE_HOST")
            .unwrap_or_else(|_| DEFAULT_OCR_SPACE_HOST.to_string());
        Some(Self::new(&host, &api_key))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn form(&self, source: &OcrSource) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("apikey", self.api_key.clone()),
            ("language", "eng".to_string()),
        ];
        match source {
            OcrSource::Url { url, .. } => form.push(("url", url.clone())),
            OcrSource::Bytes { data, file_type } => form.push((
                "base64Image",
                format!(
                    "data:{};base64,{}",
                    file_type.mime_type(),
                    base64::engine::general_purpose::STANDARD.encode(data)
                ),
            )),
        }
        if let Some(file_type) = source.file_type().as_form_value() {
            form.push(("filetype", file_type.to_string()));
        }
        form
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: Option<String>,
}

#[async_trait]
impl OcrBackend for OcrSpaceBackend {
    async fn extract_text(&self, source: &OcrSource) -> Result<Option<String>> {
        let response = self
            .http_client
            .post(format!("{}/parse/image", self.host))
            .form(&self.form(source))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "OCR.space",
                format!("API error {}: {}", status, body),
            ));
        }

        let parsed: OcrSpaceResponse = response.json().await?;
        if parsed.is_errored_on_processing {
            debug!(error = ?parsed.error_message, "OCR.space reported a processing error");
        }

        Ok(parsed
            .parsed_results
            .and_then(|results| results.into_iter().next())
            .and_then(|r| r.parsed_text)
            .filter(|text| !text.trim().is_empty()))
    }
}

/// OCR backend returning configured text
#[derive(Clone, Default)]
pub struct MockOcr {
    text: Option<String>,
}

impl MockOcr {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    /// Mock that never recognises anything
    pub fn empty() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl OcrBackend for MockOcr {
    async fn extract_text(&self, _source: &OcrSource) -> Result<Option<String>> {
        Ok(self.text.clone())
    }
}

#[derive(Clone)]
pub enum OcrClient {
    OcrSpace(OcrSpaceBackend),
    Mock(MockOcr),
}

impl OcrClient {
    /// Create from `OCR_BACKEND`; `None` when the backend is not configured
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("OCR_BACKEND").unwrap_or_else(|_| "ocrspace".to_string());
        match backend.to_lowercase().as_str() {
            "mock" => Some(OcrClient::Mock(
                std::env::var("OCR_MOCK_TEXT")
                    .ok()
                    .filter(|t| !t.is_empty())
                    .map(|t| MockOcr::with_text(&t))
                    .unwrap_or_else(MockOcr::empty),
            )),
            "ocrspace" | "ocr_space" | "" => OcrSpaceBackend::from_env().map(OcrClient::OcrSpace),
            _ => {
                tracing::warn!(backend = %backend, "Unknown OCR_BACKEND, falling back to ocrspace");
                OcrSpaceBackend::from_env().map(OcrClient::OcrSpace)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            OcrClient::OcrSpace(b) => format!("ocrspace ({})", b.host()),
            OcrClient::Mock(_) => "mock".to_string(),
        }
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn extract_text(&self, source: &OcrSource) -> Result<Option<String>> {
        match self {
            OcrClient::OcrSpace(b) => b.extract_text(source).await,
            OcrClient::Mock(b) => b.extract_text(source).await,
        }
    }
}
