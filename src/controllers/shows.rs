use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{Money, NewShow, SeatingConfig, Show, ShowId, ShowUpdate, Showtime};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows", get(list_shows).post(create_show))
        .route("/shows/{id}", get(get_show).put(update_show).delete(delete_show))
        .route("/shows/{id}/showtimes", post(add_showtime))
}

/* ---------- DTO ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateShowRequest {
    #[validate(length(min = 1, max = 255))]
    title: String,
    release_date: NaiveDate,
    #[validate(range(min = 0.0, max = 10.0))]
    rating: f32,
    #[validate(url)]
    poster_url: Option<String>,
    seating: SeatingConfig,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateShowRequest {
    #[validate(length(min = 1, max = 255))]
    title: Option<String>,
    release_date: Option<NaiveDate>,
    #[validate(range(min = 0.0, max = 10.0))]
    rating: Option<f32>,
    #[validate(url)]
    poster_url: Option<String>,
    seating: Option<SeatingConfig>,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateShowtimeRequest {
    #[validate(length(min = 1, max = 200))]
    location: String,
    date: NaiveDate,
    time: NaiveTime,
}

#[derive(Debug, Serialize)]
struct PriceTier {
    from_row: u32,
    to_row: u32,
    price: Money,
}

#[derive(Debug, Serialize)]
struct ShowDetails {
    #[serde(flatten)]
    show: Show,
    price_tiers: Vec<PriceTier>,
    showtimes: Vec<Showtime>,
}

fn price_tiers(seating: &SeatingConfig) -> Vec<PriceTier> {
    let mut tiers = vec![PriceTier { from_row: 1, to_row: seating.low_price_rows, price: seating.low_price }];
    if seating.low_price_rows < seating.rows {
        tiers.push(PriceTier {
            from_row: seating.low_price_rows + 1,
            to_row: seating.rows,
            price: seating.high_price,
        });
    }
    tiers
}

/* ---------- SHOWS ---------- */

// GET /api/shows
async fn list_shows(State(state): State<Arc<AppState>>) -> Json<Vec<Show>> {
    Json(state.booking.catalog().list_shows().await)
}

// GET /api/shows/{id}
async fn get_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowId>,
) -> Result<impl IntoResponse, AppError> {
    let catalog = state.booking.catalog();
    let show = catalog.get_show(id).await?;
    let showtimes = catalog.showtimes_of(id).await;

    Ok(Json(ShowDetails {
        price_tiers: price_tiers(&show.seating),
        show,
        showtimes,
    }))
}

// POST /api/shows
async fn create_show(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateShowRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let draft = NewShow {
        title: req.title,
        release_date: req.release_date,
        rating: req.rating,
        poster_url: req.poster_url,
        seating: req.seating,
    };
    let show = state.booking.create_show(&user.user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(show)))
}

// PUT /api/shows/{id}
async fn update_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowId>,
    user: AuthUser,
    Json(req): Json<UpdateShowRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let patch = ShowUpdate {
        title: req.title,
        release_date: req.release_date,
        rating: req.rating,
        poster_url: req.poster_url,
        seating: req.seating,
    };
    let show = state.booking.update_show(id, &user.user_id, patch).await?;
    Ok(Json(show))
}

// DELETE /api/shows/{id}
async fn delete_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowId>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    state.booking.delete_show(id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/shows/{id}/showtimes
async fn add_showtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ShowId>,
    user: AuthUser,
    Json(req): Json<CreateShowtimeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let showtime = state
        .booking
        .add_showtime(id, &user.user_id, &req.location, req.date, req.time)
        .await?;
    Ok((StatusCode::CREATED, Json(showtime)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_split_at_low_price_rows() {
        let seating = SeatingConfig { rows: 5, columns: 4, low_price_rows: 2, low_price: 100, high_price: 200 };
        let tiers = price_tiers(&seating);
        assert_eq!(tiers.len(), 2);
        assert_eq!((tiers[0].from_row, tiers[0].to_row, tiers[0].price), (1, 2, 100));
        assert_eq!((tiers[1].from_row, tiers[1].to_row, tiers[1].price), (3, 5, 200));

        let all_cheap = SeatingConfig { low_price_rows: 5, ..seating };
        assert_eq!(price_tiers(&all_cheap).len(), 1);
    }
}
