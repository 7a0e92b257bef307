//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `extract` - Receipt and voice-text extraction
//! - `jobs` - One-shot notification job runs
//! - `prompts` - Prompt library management commands
//! - `serve` - Web server command
//! - `status` - Store and provider configuration

pub mod extract;
pub mod jobs;
pub mod prompts;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use extract::*;
pub use jobs::*;
pub use prompts::*;
pub use serve::*;
pub use status::*;

use std::path::Path;

use anyhow::{Context, Result};
use spendcheck_core::{Database, StoreClient};

/// Open the configured store; the local store is encrypted unless --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_string_lossy();
    let store = StoreClient::from_env(&path_str, !no_encrypt).context("Failed to open store")?;
    Ok(Database::new(store))
}
