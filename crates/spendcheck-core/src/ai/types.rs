//! Backend-agnostic response types

use std::fmt;

use serde::Serialize;

/// Transaction type as detected from receipt or voice text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectedType {
    Income,
    Expense,
    Unknown,
}

impl DetectedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router configuration information for display
#[derive(Debug, Clone, Serialize)]
pub struct RouterInfo {
    /// Default model for all tasks
    pub default_model: String,
    /// Fallback model when primary fails
    pub fallback_model: Option<String>,
    /// Task-specific model overrides (only non-default)
    pub task_models: Vec<(String, String)>,
}
