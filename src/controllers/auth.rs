use axum::{extract::State, http::StatusCode, routing::post, Router};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/revoke", post(revoke_token))
}

// POST /api/auth/revoke - отзывает предъявленный токен (logout)
async fn revoke_token(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<StatusCode, AppError> {
    state.verifier.revoke(&user).await?;
    info!("Token revoked for {}", user.user_id);
    Ok(StatusCode::NO_CONTENT)
}
