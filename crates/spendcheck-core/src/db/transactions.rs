//! Transaction operations

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::codec::{transaction_from_document, transaction_to_fields};
use super::{transaction_path, transactions_path, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction, TransactionFilter, TransactionUpdate};
use crate::store::{Direction, DocumentStore, FieldValue, FilterOp, Query};

impl Database {
    /// Validate and store a new transaction, returning its id
    pub async fn add_transaction(&self, uid: &str, input: NewTransaction) -> Result<String> {
        self.add_transaction_at(uid, input, Utc::now()).await
    }

    pub async fn add_transaction_at(
        &self,
        uid: &str,
        input: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let tx = input.into_transaction(now)?;
        let id = self
            .store
            .create(&transactions_path(uid), transaction_to_fields(&tx))
            .await?;
        info!(
            user_id = %uid,
            transaction_id = %id,
            transaction_type = %tx.transaction_type,
            "Transaction added"
        );
        Ok(id)
    }

    pub async fn get_transaction(&self, uid: &str, id: &str) -> Result<Option<Transaction>> {
        let path = transaction_path(uid, id)?;
        Ok(self
            .store
            .get(&path)
            .await?
            .as_ref()
            .and_then(transaction_from_document))
    }

    /// Apply a partial update and return the stored result
    pub async fn update_transaction(
        &self,
        uid: &str,
        id: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        let mut tx = self
            .get_transaction(uid, id)
            .await?
            .ok_or_else(|| Error::NotFound("Transaction not found".into()))?;

        update.apply(&mut tx, Utc::now())?;

        let path = transaction_path(uid, id)?;
        self.store
            .set(&path, transaction_to_fields(&tx), false)
            .await?;
        debug!(user_id = %uid, transaction_id = %id, "Transaction updated");
        Ok(tx)
    }

    pub async fn delete_transaction(&self, uid: &str, id: &str) -> Result<()> {
        let path = transaction_path(uid, id)?;
        if self.store.get(&path).await?.is_none() {
            return Err(Error::NotFound("Transaction not found".into()));
        }
        self.store.delete(&path).await?;
        info!(user_id = %uid, transaction_id = %id, "Transaction deleted");
        Ok(())
    }

    /// Transactions matching the filter, newest first.
    ///
    /// Category is an exact match; date bounds are inclusive.
    pub async fn list_transactions(
        &self,
        uid: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let mut query = Query::new();
        if let Some(category) = &filter.category {
            query = query.filter("category", FilterOp::Eq, category.as_str());
        }
        if let Some(start) = filter.start {
            query = query.filter("date", FilterOp::Gte, FieldValue::Timestamp(start));
        }
        if let Some(end) = filter.end {
            query = query.filter("date", FilterOp::Lte, FieldValue::Timestamp(end));
        }
        query = query.order_by("date", Direction::Descending);

        let docs = self.store.query(&transactions_path(uid), &query).await?;
        let total = docs.len();
        let transactions: Vec<Transaction> =
            docs.iter().filter_map(transaction_from_document).collect();

        if transactions.len() < total {
            debug!(
                user_id = %uid,
                skipped = total - transactions.len(),
                "Skipped malformed transaction documents"
            );
        }
        Ok(transactions)
    }

    /// Every transaction of a user, newest first
    pub async fn all_transactions(&self, uid: &str) -> Result<Vec<Transaction>> {
        self.list_transactions(uid, &TransactionFilter::default())
            .await
    }
}
