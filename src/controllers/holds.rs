use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use super::parse_labels;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{HoldId, SeatMapView, ShowtimeId};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes/{id}/seats", get(get_seat_map))
        .route("/showtimes/{id}/holds", post(hold_seats))
        .route("/holds/{id}", get(get_hold).delete(release_hold))
        .route("/holds/{id}/confirm", post(confirm_hold))
}

#[derive(Debug, Deserialize, Validate)]
struct HoldSeatsRequest {
    #[validate(length(min = 1, max = 100))]
    seats: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct ConfirmHoldRequest {
    #[validate(length(min = 1, max = 128))]
    payment_ref: String,
}

// GET /api/showtimes/{id}/seats
async fn get_seat_map(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowtimeId>,
) -> Result<Json<SeatMapView>, AppError> {
    Ok(Json(state.booking.seat_map(id).await?))
}

// POST /api/showtimes/{id}/holds
async fn hold_seats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowtimeId>,
    user: AuthUser,
    Json(req): Json<HoldSeatsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let seats = parse_labels(&req.seats)?;

    let hold = state.booking.hold_seats(id, &seats, &user.user_id).await?;
    Ok((StatusCode::CREATED, Json(hold)))
}

// GET /api/holds/{id}
async fn get_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<HoldId>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.booking.get_hold(id, &user.user_id).await?))
}

// DELETE /api/holds/{id}
async fn release_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<HoldId>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    state.booking.release_hold(id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/holds/{id}/confirm
async fn confirm_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<HoldId>,
    user: AuthUser,
    Json(req): Json<ConfirmHoldRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let booking = state.booking.confirm_booking(id, &user.user_id, &req.payment_ref).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}
