use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{HoldId, SeatCoord};
use crate::repository::StorageError;

/// Ошибки доменного слоя и HTTP API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Идентификатор не найден
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// Нет токена или токен не прошёл проверку
    #[error("authentication required")]
    Unauthenticated,

    /// Вызывающий не владелец ресурса / нет нужной роли
    #[error("not allowed: {0}")]
    Unauthorized(String),

    /// Некорректная конфигурация зала, координаты вне сетки, битые входные данные
    #[error("invalid request: {0}")]
    InvalidSpec(String),

    /// Проигрыш в гонке за места; клиент может повторить с актуальной схемой
    #[error("seats unavailable: {}", join_labels(.conflicts))]
    SeatUnavailable { conflicts: Vec<SeatCoord> },

    /// Холд истёк или был снят до подтверждения
    #[error("hold {hold_id} is no longer active")]
    HoldExpired { hold_id: HoldId },

    /// Нарушение машины состояний бронирования
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    #[error("payment gateway unavailable: {0}")]
    PaymentUnavailable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn join_labels(seats: &[SeatCoord]) -> String {
    seats.iter().map(SeatCoord::to_string).collect::<Vec<_>>().join(", ")
}

impl AppError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        AppError::NotFound { resource, id: id.to_string() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            AppError::SeatUnavailable { .. } => StatusCode::CONFLICT,
            AppError::HoldExpired { .. } => StatusCode::GONE,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Машиночитаемый код ошибки для клиента.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "not_found",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InvalidSpec(_) => "invalid_spec",
            AppError::SeatUnavailable { .. } => "seat_unavailable",
            AppError::HoldExpired { .. } => "hold_expired",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::PaymentDeclined(_) => "payment_declined",
            AppError::PaymentUnavailable(_) => "payment_unavailable",
            AppError::Storage(_) => "internal",
        }
    }

    /// Сообщение без внутренних деталей (ошибки БД наружу не отдаём).
    pub fn user_message(&self) -> String {
        match self {
            AppError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidSpec(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<Vec<SeatCoord>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Storage(_) | AppError::PaymentUnavailable(_) => {
                tracing::error!("Request failed: {:#}", self);
            }
            AppError::SeatUnavailable { .. } | AppError::HoldExpired { .. } | AppError::PaymentDeclined(_) => {
                tracing::info!("Booking rejected: {}", self);
            }
            AppError::Unauthenticated | AppError::Unauthorized(_) => {
                tracing::info!("Authorization error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let conflicts = match &self {
            AppError::SeatUnavailable { conflicts } => Some(conflicts.clone()),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: self.code(),
            message: self.user_message(),
            conflicts,
        };

        (self.status_code(), Json(body)).into_response()
    }
}
