//! Device token and notification job handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppError, AppState, AuthUser, SuccessResponse};
use spendcheck_core::{JobKind, JobReport};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmTokenRequest {
    #[serde(default, alias = "fcmToken")]
    pub token: Option<String>,
}

/// PUT /api/users/:uid/fcm-token - Register the device for push notifications
pub async fn set_fcm_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(request): Json<FcmTokenRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    user.ensure_owner(&uid)?;
    state
        .db
        .set_fcm_token(&uid, request.token.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(SuccessResponse::new("Token saved successfully")))
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub success: bool,
    pub reports: Vec<JobReport>,
}

/// POST /api/users/:uid/notifications/check - Run every job for the caller
pub async fn check_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<JobsResponse>, AppError> {
    user.ensure_owner(&uid)?;

    let jobs = state.jobs();
    let now = Utc::now();
    let mut reports = Vec::with_capacity(JobKind::all().len());
    for kind in JobKind::all() {
        reports.push(jobs.run_for_user(*kind, &uid, now).await?);
    }

    Ok(Json(JobsResponse {
        success: true,
        reports,
    }))
}

/// POST /api/admin/jobs/:job/run - Run one job (or `all`) over every user
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
) -> Result<Json<JobsResponse>, AppError> {
    let jobs = state.jobs();
    let now = Utc::now();

    let reports = if job.eq_ignore_ascii_case("all") {
        jobs.run_all(now).await?
    } else {
        let kind: JobKind = job.parse()?;
        vec![jobs.run(kind, now).await?]
    };
    info!(job = %job, runs = reports.len(), "Manual job run finished");

    Ok(Json(JobsResponse {
        success: true,
        reports,
    }))
}
