//! Spending analytics handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;

use super::transactions::TransactionQuery;
use crate::{AppError, AppState, AuthUser};
use spendcheck_core::analytics::{
    category_breakdown, monthly_analysis as analyse_months, monthly_trend, CategoryBreakdown,
    MonthlyAnalysis, MonthlyTrend,
};
use spendcheck_core::models::TransactionFilter;

/// GET /api/users/:uid/analytics/categories - Spending per category
pub async fn category_analytics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<CategoryBreakdown>, AppError> {
    user.ensure_owner(&uid)?;
    let filter = TransactionFilter {
        category: None,
        ..params.to_filter()?
    };
    let transactions = state.db.list_transactions(&uid, &filter).await?;
    Ok(Json(category_breakdown(&transactions)))
}

/// GET /api/users/:uid/analytics/monthly - Monthly totals with change
pub async fn monthly_analytics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<MonthlyTrend>, AppError> {
    user.ensure_owner(&uid)?;
    let filter = TransactionFilter {
        category: None,
        ..params.to_filter()?
    };
    let transactions = state.db.list_transactions(&uid, &filter).await?;
    Ok(Json(monthly_trend(&transactions)))
}

/// Parse a required `YYYY-MM-DD` pair
fn date_range(params: &TransactionQuery) -> Result<TransactionFilter, AppError> {
    let (Some(start), Some(end)) = (
        params.start_date.as_deref().filter(|s| !s.is_empty()),
        params.end_date.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::bad_request("startDate and endDate are required"));
    };

    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AppError::bad_request("Invalid date format. Use YYYY-MM-DD"))
    };

    Ok(TransactionFilter::between(parse(start)?, parse(end)?))
}

/// GET /api/users/:uid/transactions/monthly-analysis - Spending rows with summaries
pub async fn monthly_analysis(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<MonthlyAnalysis>, AppError> {
    user.ensure_owner(&uid)?;
    let filter = date_range(&params)?;
    let transactions = state.db.list_transactions(&uid, &filter).await?;
    Ok(Json(analyse_months(&transactions)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn query(start: Option<&str>, end: Option<&str>) -> TransactionQuery {
        TransactionQuery {
            category: None,
            start_date: start.map(str::to_string),
            end_date: end.map(str::to_string),
        }
    }

    #[test]
    fn test_date_range_requires_both() {
        let err = date_range(&query(Some("2025-01-01"), None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_date_range_format() {
        assert!(date_range(&query(Some("2025-01-01"), Some("2025-03-31"))).is_ok());
        let err = date_range(&query(Some("2025-01-01T00:00:00Z"), Some("2025-03-31"))).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
