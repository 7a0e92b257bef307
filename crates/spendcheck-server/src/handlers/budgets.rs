//! Monthly budget handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppError, AppState, AuthUser, SuccessResponse};
use spendcheck_core::analytics::{budget_summary, BudgetSummary};
use spendcheck_core::models::{MonthlyBudget, TransactionFilter};

#[derive(Debug, Deserialize)]
pub struct SaveBudgetRequest {
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub budgets: Option<BTreeMap<String, serde_json::Value>>,
}

/// POST /api/users/:uid/budgets - Save (merge) limits for a month
pub async fn save_budget(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(request): Json<SaveBudgetRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), AppError> {
    user.ensure_owner(&uid)?;

    let (Some(month), Some(budgets)) = (request.month, request.budgets) else {
        return Err(AppError::bad_request(
            "Missing required fields: month and budgets",
        ));
    };
    state.db.set_budget(&uid, &month, &budgets).await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::new("Budget saved successfully")),
    ))
}

/// GET /api/users/:uid/budgets/:month
///
/// A missing budget is a 200 with `success: false`.
pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, month)): Path<(String, String)>,
) -> Result<Response, AppError> {
    user.ensure_owner(&uid)?;

    let response = match state.db.get_budget(&uid, &month).await? {
        Some(budget) => Json(json!({"success": true, "budget": budget})).into_response(),
        None => Json(json!({
            "success": false,
            "message": "No budget found for this month"
        }))
        .into_response(),
    };
    Ok(response)
}

#[derive(Serialize)]
pub struct BudgetListResponse {
    pub success: bool,
    pub budgets: BTreeMap<String, MonthlyBudget>,
}

/// GET /api/users/:uid/budgets - Every budget keyed by month
pub async fn list_budgets(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<BudgetListResponse>, AppError> {
    user.ensure_owner(&uid)?;
    let budgets = state.db.list_budgets(&uid).await?;
    Ok(Json(BudgetListResponse {
        success: true,
        budgets,
    }))
}

/// DELETE /api/users/:uid/budgets/:month
pub async fn delete_budget(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, month)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    user.ensure_owner(&uid)?;
    state.db.delete_budget(&uid, &month).await?;
    Ok(Json(SuccessResponse::new("Budget deleted successfully")))
}

/// GET /api/users/:uid/get_budget_summary/:month - Limits and expense totals
pub async fn get_budget_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((uid, month)): Path<(String, String)>,
) -> Result<Json<BudgetSummary>, AppError> {
    user.ensure_owner(&uid)?;

    let budget = state.db.get_budget(&uid, &month).await?;
    let transactions = state
        .db
        .list_transactions(&uid, &TransactionFilter::default())
        .await?;
    Ok(Json(budget_summary(budget, &transactions, &month)))
}
