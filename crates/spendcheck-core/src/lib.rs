//! SpendCheck Core Library
//!
//! Shared functionality for the SpendCheck personal finance backend:
//! - Transactions, budgets and user documents over a pluggable document
//!   store (Firestore or an encrypted local SQLite store)
//! - Spending analytics, budget alerts and month-end forecasts
//! - Receipt and voice extraction through OCR and language-model providers
//! - Model router for task-based model selection
//! - Prompt library for customizable model prompts
//! - Push notifications and the notification jobs that send them
//! - File storage for uploaded bills

pub mod ai;
pub mod analytics;
pub mod db;
pub mod error;
pub mod extraction;
pub mod google_auth;
pub mod jobs;
pub mod model_router;
pub mod models;
pub mod ocr;
pub mod prompts;
pub mod push;
pub mod storage;
pub mod store;

/// Test utilities including a mock provider server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, DetectedType, GeminiBackend, MockBackend, OpenAICompatibleBackend, RouterInfo};
pub use db::Database;
pub use error::{Error, Result};
pub use extraction::{extract_from_document, extract_transaction, ExtractionResult};
pub use jobs::{JobKind, JobReport, Notification, NotificationJobs};
pub use model_router::{ModelRouter, RouterConfig, TaskConfig, TaskType};
pub use models::{
    MonthlyBudget, NewTransaction, Transaction, TransactionFilter, TransactionType,
    TransactionUpdate, UserRecord,
};
pub use ocr::{MockOcr, OcrBackend, OcrClient, OcrFileType, OcrSource, OcrSpaceBackend};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use push::{FcmBackend, MockPush, PushBackend, PushClient, PushReceipt};
pub use storage::{CloudinaryStorage, LocalStorage, StorageBackend, StorageClient};
pub use store::{DocumentStore, FirestoreStore, LocalStore, StoreClient};
