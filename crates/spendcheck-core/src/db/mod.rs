//! Domain repository over the document store
//!
//! This module is organized by domain:
//! - `transactions` - transaction CRUD and filtered listing
//! - `budgets` - monthly budget documents
//! - `users` - user documents and device tokens

use crate::error::{Error, Result};
use crate::store::{is_valid_segment, StoreClient};

mod budgets;
mod codec;
mod transactions;
mod users;

/// Typed access to user data
#[derive(Clone)]
pub struct Database {
    store: StoreClient,
}

impl Database {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Local unencrypted store in a temp file (for testing)
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(StoreClient::Local(
            crate::store::LocalStore::in_memory()?,
        )))
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }
}

pub(crate) fn user_path(uid: &str) -> String {
    format!("users/{}", uid)
}

pub(crate) fn transactions_path(uid: &str) -> String {
    format!("users/{}/transactions", uid)
}

/// Document path of one transaction. Ids from URLs must name a single
/// document under the user's own collection.
pub(crate) fn transaction_path(uid: &str, id: &str) -> Result<String> {
    if !is_valid_segment(uid) || !is_valid_segment(id) {
        return Err(Error::InvalidData("Invalid transaction id".into()));
    }
    Ok(format!("{}/{}", transactions_path(uid), id))
}

pub(crate) fn budgets_path(uid: &str) -> String {
    format!("users/{}/budgets", uid)
}
