//! Monthly budget operations

use std::collections::BTreeMap;

use tracing::info;

use super::codec::{budget_from_document, budget_to_fields};
use super::{budgets_path, Database};
use crate::error::{Error, Result};
use crate::models::{parse_month_key, MonthlyBudget};
use crate::store::DocumentStore;

fn budget_path(uid: &str, month: &str) -> Result<String> {
    if parse_month_key(month).is_none() {
        return Err(Error::InvalidData(
            "Invalid month format. Use YYYY-MM".into(),
        ));
    }
    Ok(format!("{}/{}", budgets_path(uid), month))
}

impl Database {
    /// Save limits for a month.
    ///
    /// Merges into any existing budget: categories not given keep their limit.
    pub async fn set_budget(
        &self,
        uid: &str,
        month: &str,
        budgets: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        if month.trim().is_empty() || budgets.is_empty() {
            return Err(Error::InvalidData(
                "Missing required fields: month and budgets".into(),
            ));
        }
        let path = budget_path(uid, month)?;
        self.store
            .set(&path, budget_to_fields(month, budgets), true)
            .await?;
        info!(user_id = %uid, month = %month, categories = budgets.len(), "Budget saved");
        Ok(())
    }

    pub async fn get_budget(&self, uid: &str, month: &str) -> Result<Option<MonthlyBudget>> {
        let path = budget_path(uid, month)?;
        Ok(self
            .store
            .get(&path)
            .await?
            .as_ref()
            .map(budget_from_document))
    }

    /// All budgets keyed by document id
    pub async fn list_budgets(&self, uid: &str) -> Result<BTreeMap<String, MonthlyBudget>> {
        let docs = self
            .store
            .query(&budgets_path(uid), &Default::default())
            .await?;
        Ok(docs
            .iter()
            .map(|doc| (doc.id.clone(), budget_from_document(doc)))
            .collect())
    }

    pub async fn delete_budget(&self, uid: &str, month: &str) -> Result<()> {
        let path = budget_path(uid, month)?;
        self.store.delete(&path).await?;
        info!(user_id = %uid, month = %month, "Budget deleted");
        Ok(())
    }
}
