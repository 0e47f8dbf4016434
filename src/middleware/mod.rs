use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::User;

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// The authenticated caller, freshly loaded from the ledger.
///
/// Rejects with 401 on a missing or invalid token, or when the token's user
/// no longer exists.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let user_id = state.tokens.verify(token)?;

        let conn = state.db.get()?;
        let user = queries::get_user_by_id(&conn, user_id)?.ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser(user))
    }
}
