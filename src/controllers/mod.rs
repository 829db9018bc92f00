pub mod auth;
pub mod bookings;
pub mod holds;
pub mod shows;

use axum::Router;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::SeatCoord;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(shows::routes())
        .merge(holds::routes())
        .merge(bookings::routes())
        .merge(auth::routes())
}

/// Разбирает метки мест из запроса ("A1", "B12").
pub(crate) fn parse_labels(labels: &[String]) -> Result<Vec<SeatCoord>, AppError> {
    labels
        .iter()
        .map(|label| {
            label
                .parse::<SeatCoord>()
                .map_err(|e| AppError::InvalidSpec(format!("seat '{label}': {e}")))
        })
        .collect()
}
