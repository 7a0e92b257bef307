//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, AuthUser, SuccessResponse};
use spendcheck_core::models::{
    parse_iso_datetime, NewTransaction, Transaction, TransactionFilter, TransactionUpdate,
};

/// Query parameters for transaction listing and analytics
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl TransactionQuery {
    /// Build a store filter; blank parameters are ignored
    pub fn to_filter(&self) -> Result<TransactionFilter, AppError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let mut filter = TransactionFilter {
            category: non_empty(&self.category),
            ..Default::default()
        };
        if let Some(start) = non_empty(&self.start_date) {
            filter.start = Some(
                parse_iso_datetime(&start)
                    .ok_or_else(|| AppError::bad_request("Invalid start date format"))?,
            );
        }
        if let Some(end) = non_empty(&self.end_date) {
            filter.end = Some(
                parse_iso_datetime(&end)
                    .ok_or_else(|| AppError::bad_request("Invalid end date format"))?,
            );
        }
        Ok(filter)
    }
}

/// Response for a created transaction
#[derive(Serialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: String,
    pub message: String,
}

/// POST /api/users/:uid/transactions - Validate and store a transaction
pub async fn add_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(input): Json<NewTransaction>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    user.ensure_owner(&uid)?;

    let id = state.db.add_transaction(&uid, input).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            success: true,
            id,
            message: "Transaction added successfully".to_string(),
        }),
    ))
}

/// GET /api/users/:uid/transactions - Filtered list, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    user.ensure_owner(&uid)?;
    let filter = params.to_filter()?;
    let transactions = state.db.list_transactions(&uid, &filter).await?;
    Ok(Json(transactions))
}

/// GET /api/users/:uid/transactions/:id - One transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, id)): Path<(String, String)>,
) -> Result<Json<Transaction>, AppError> {
    user.ensure_owner(&uid)?;
    let transaction = state
        .db
        .get_transaction(&uid, &id)
        .await?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(transaction))
}

/// PATCH /api/users/:uid/transactions/:id - Edit fields or attach a bill
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, id)): Path<(String, String)>,
    Json(update): Json<TransactionUpdate>,
) -> Result<Json<Transaction>, AppError> {
    user.ensure_owner(&uid)?;
    if update.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    let transaction = state.db.update_transaction(&uid, &id, update).await?;
    Ok(Json(transaction))
}

/// DELETE /api/users/:uid/transactions/:id
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    user.ensure_owner(&uid)?;
    state.db.delete_transaction(&uid, &id).await?;
    Ok(Json(SuccessResponse::new("Transaction deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_filter() {
        let query = TransactionQuery {
            category: Some("  ".into()),
            start_date: Some("2025-03-01".into()),
            end_date: Some("2025-03-31T23:59:59Z".into()),
        };
        let filter = query.to_filter().unwrap();
        assert!(filter.category.is_none());
        assert!(filter.start.is_some());
        assert!(filter.end.is_some());

        let bad = TransactionQuery {
            start_date: Some("yesterday".into()),
            ..Default::default()
        };
        assert_eq!(
            bad.to_filter().unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
