use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{Booking, BookingId};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings))
        .route("/bookings/refunds", get(get_pending_refunds))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/refund", post(request_refund))
        .route("/bookings/{id}/refund/resolve", post(resolve_refund))
}

#[derive(Debug, Deserialize)]
struct ResolveRefundRequest {
    approve: bool,
}

// GET /api/bookings
async fn get_user_bookings(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<Vec<Booking>> {
    Json(state.booking.bookings_for(&user.user_id).await)
}

// GET /api/bookings/refunds
async fn get_pending_refunds(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin {
        return Err(AppError::Unauthorized("the refund queue requires the admin role".to_string()));
    }
    Ok(Json(state.booking.pending_refunds().await))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BookingId>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.booking.get_booking(id, &user.user_id, user.is_admin).await?))
}

// POST /api/bookings/{id}/refund
async fn request_refund(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BookingId>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.booking.request_refund(id, &user.user_id).await?))
}

// POST /api/bookings/{id}/refund/resolve
async fn resolve_refund(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BookingId>,
    user: AuthUser,
    Json(req): Json<ResolveRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin {
        return Err(AppError::Unauthorized("refund decisions require the admin role".to_string()));
    }
    Ok(Json(state.booking.resolve_refund(id, req.approve).await?))
}
