//! Identity handler

use axum::{Extension, Json};

use crate::AuthUser;

/// GET /api/me - The authenticated caller
pub async fn get_me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}
