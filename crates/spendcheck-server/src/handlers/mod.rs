//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod analytics;
pub mod auth;
pub mod budgets;
pub mod extraction;
pub mod jobs;
pub mod transactions;
pub mod upload;

// Re-export all handlers for use in router
pub use analytics::*;
pub use auth::*;
pub use budgets::*;
pub use extraction::*;
pub use jobs::*;
pub use transactions::*;
pub use upload::*;
