use axum::{
    Router,
    extract::State,
    middleware,
    routing::{get, post},
};

use crate::crypto;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::middleware::CurrentUser;
use crate::models::{LoginRequest, SignupRequest, TokenResponse, UserResponse};
use crate::rate_limit;

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<TokenResponse>> {
    request.validate()?;

    let password_hash = crypto::hash_password(&request.password)?;
    let conn = state.db.get()?;
    let user = queries::create_user(&conn, &request.email, &password_hash)?;

    tracing::info!(user_id = user.id, "user registered");

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_email(&conn, &request.email)?;

    let user = match user {
        Some(user) if crypto::verify_password(&request.password, &user.password_hash) => user,
        _ => {
            tracing::debug!("login rejected: bad credentials");
            return Err(AppError::Unauthorized);
        }
    };

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

pub fn router(state: &AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route_layer(middleware::from_fn_with_state(
            state.auth_limiter.clone(),
            rate_limit::enforce,
        ));

    Router::new().merge(limited).route("/auth/me", get(me))
}
