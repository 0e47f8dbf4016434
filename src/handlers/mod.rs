pub mod auth;
pub mod billing;
pub mod public;

use axum::Router;

use crate::db::AppState;

/// All routes with state applied. Tracing and CORS layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(auth::router(&state))
        .merge(billing::router(&state))
        .with_state(state)
}
