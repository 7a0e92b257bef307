//! User documents

use tracing::info;

use super::{user_path, Database};
use crate::error::{Error, Result};
use crate::models::UserRecord;
use crate::store::{DocumentStore, FieldValue, Fields};

impl Database {
    /// Every user, including users that only have subcollection data
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let ids = self.store.list_documents("users").await?;
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            users.push(self.get_user(&id).await?);
        }
        Ok(users)
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord> {
        let doc = self.store.get(&user_path(uid)).await?;
        let fcm_token = doc
            .as_ref()
            .and_then(|d| d.get_str("fcmToken"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Ok(UserRecord {
            id: uid.to_string(),
            fcm_token,
        })
    }

    /// Register the device token push notifications are sent to
    pub async fn set_fcm_token(&self, uid: &str, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidData("No token provided".into()));
        }
        let mut fields = Fields::new();
        fields.insert("fcmToken".into(), FieldValue::from(token));
        self.store.set(&user_path(uid), fields, true).await?;
        info!(user_id = %uid, "Device token registered");
        Ok(())
    }
}
