//! File storage for uploaded bills and receipts
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`: Cloudinary
//! - `CLOUDINARY_HOST`: API base URL (default: https://api.cloudinary.com)
//! - `SPENDCHECK_UPLOAD_DIR`: local upload directory when Cloudinary is not set
//!   (default: ~/.local/share/spendcheck/uploads)

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const DEFAULT_CLOUDINARY_HOST: &str = "https://api.cloudinary.com";

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf"];

/// Reject files with a disallowed extension or over the size limit
pub fn validate_upload(file_name: &str, size: usize) -> Result<()> {
    let allowed = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);
    if !allowed {
        return Err(Error::InvalidData(format!(
            "File type not allowed. Use one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::InvalidData("File too large (max 10 MB)".into()));
    }
    Ok(())
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store the file and return a URL it can be fetched from
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<String>;
}

/// Cloudinary signed raw upload
#[derive(Clone)]
pub struct CloudinaryStorage {
    http_client: Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStorage {
    pub fn new(host: &str, cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            upload_url: format!(
                "{}/v1_1/{}/raw/upload",
                host.trim_end_matches('/'),
                cloud_name
            ),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let cloud_name = var("CLOUDINARY_CLOUD_NAME")?;
        let api_key = var("CLOUDINARY_API_KEY")?;
        let api_secret = var("CLOUDINARY_API_SECRET")?;
        let host = var("CLOUDINARY_HOST").unwrap_or_else(|| DEFAULT_CLOUDINARY_HOST.to_string());
        Some(Self::new(&host, &cloud_name, &api_key, &api_secret))
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Hex SHA-256 of the sorted signed parameters followed by the secret
    pub fn signature(&self, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("timestamp={}{}", timestamp, self.api_secret));
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
}

#[async_trait]
impl StorageBackend for CloudinaryStorage {
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<String> {
        validate_upload(file_name, data.len())?;

        let timestamp = Utc::now().timestamp();
        let form = Form::new()
            .part("file", Part::bytes(data).file_name(file_name.to_string()))
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", self.signature(timestamp))
            .text("signature_algorithm", "sha256");

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "Cloudinary",
                format!("upload failed {}: {}", status, body),
            ));
        }

        let uploaded: CloudinaryResponse = response.json().await?;
        tracing::info!(url = %uploaded.secure_url, "Uploaded file");
        Ok(uploaded.secure_url)
    }
}

/// Files written to a local directory, addressed by `file://` URLs
#[derive(Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("SPENDCHECK_UPLOAD_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(default_upload_dir)
            .map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Content-addressed name keeping the original extension-bearing name
fn stored_name(file_name: &str, data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    let safe: String = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", &digest[..16], safe)
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<String> {
        validate_upload(file_name, data.len())?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(stored_name(file_name, &data));
        tokio::fs::write(&path, &data).await?;

        let absolute = std::path::absolute(&path).unwrap_or(path);
        Ok(format!("file://{}", absolute.display()))
    }
}

#[derive(Clone)]
pub enum StorageClient {
    Cloudinary(CloudinaryStorage),
    Local(LocalStorage),
}

impl StorageClient {
    /// Cloudinary when fully configured, else a local directory
    pub fn from_env() -> Option<Self> {
        CloudinaryStorage::from_env()
            .map(StorageClient::Cloudinary)
            .or_else(|| LocalStorage::from_env().map(StorageClient::Local))
    }

    pub fn describe(&self) -> String {
        match self {
            StorageClient::Cloudinary(c) => format!("cloudinary ({})", c.upload_url()),
            StorageClient::Local(l) => format!("local ({})", l.dir().display()),
        }
    }
}

#[async_trait]
impl StorageBackend for StorageClient {
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<String> {
        match self {
            StorageClient::Cloudinary(c) => c.upload(file_name, data).await,
            StorageClient::Local(l) => l.upload(file_name, data).await,
        }
    }
}

pub fn default_upload_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcheck").join("uploads"))
}
