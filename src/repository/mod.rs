//! Слой хранения.
//!
//! Состояние мест живёт в памяти (см. `inventory`), а репозиторий - это
//! write-through журнал, из которого это состояние восстанавливается при старте.
//! Каждая мутация сначала пишется в репозиторий и только потом применяется в памяти.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Booking, BookingId, BookingStatus, HoldId, SeatHold, Show, ShowId, Showtime};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Уникальность `payment_ref` в таблице броней
    #[error("payment reference {0} is already recorded")]
    DuplicatePaymentRef(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Repository: Send + Sync {
    // --- каталог ---
    async fn insert_show(&self, show: &Show) -> Result<(), StorageError>;
    async fn update_show(&self, show: &Show) -> Result<(), StorageError>;
    /// Удаляет шоу вместе с сеансами и их холдами.
    async fn delete_show(&self, id: ShowId) -> Result<(), StorageError>;
    async fn insert_showtime(&self, showtime: &Showtime) -> Result<(), StorageError>;
    async fn load_catalog(&self) -> Result<(Vec<Show>, Vec<Showtime>), StorageError>;

    // --- холды ---
    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), StorageError>;
    async fn delete_holds(&self, ids: &[HoldId]) -> Result<(), StorageError>;
    /// Атомарно: удалить холд и записать бронирование.
    async fn promote_hold(&self, hold_id: HoldId, booking: &Booking) -> Result<(), StorageError>;
    /// Удаляет просроченные холды и возвращает оставшиеся.
    async fn load_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<SeatHold>, StorageError>;

    // --- бронирования ---
    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
    async fn load_bookings(&self) -> Result<Vec<Booking>, StorageError>;
}
