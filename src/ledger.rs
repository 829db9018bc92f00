//! Журнал бронирований и машина состояний возврата.
//!
//! `confirmed -> refund_requested -> refunded | confirmed`. Других переходов нет.
//!
//! Переходы сериализуются отдельным мьютексом `transitions`; индекс броней берётся
//! на запись только на время вставки, не через запись в репозиторий.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::clock::Clock;
use crate::error::AppError;
use crate::inventory::SeatInventory;
use crate::models::{Booking, BookingId, BookingStatus, ShowtimeId, UserId};
use crate::repository::Repository;

pub struct BookingLedger {
    inventory: Arc<SeatInventory>,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    transitions: Mutex<()>,
}

impl BookingLedger {
    pub fn new(inventory: Arc<SeatInventory>, repo: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inventory,
            repo,
            clock,
            bookings: RwLock::new(HashMap::new()),
            transitions: Mutex::new(()),
        }
    }

    pub async fn hydrate(&self, bookings: Vec<Booking>) {
        let mut index = self.bookings.write().await;
        *index = bookings.into_iter().map(|b| (b.id, b)).collect();
        info!("Booking ledger hydrated: {} bookings", index.len());
    }

    /// Добавляет подтверждённую бронь. Сама бронь уже записана в репозиторий движком мест.
    pub async fn record_booking(&self, booking: Booking) -> Result<(), AppError> {
        let mut index = self.bookings.write().await;
        if index.contains_key(&booking.id) {
            return Err(AppError::InvalidTransition(format!(
                "booking {} is already recorded",
                booking.id
            )));
        }
        index.insert(booking.id, booking);
        Ok(())
    }

    pub async fn get(&self, id: BookingId) -> Result<Booking, AppError> {
        self.bookings
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("booking", id))
    }

    /// Брони пользователя, новые первыми.
    pub async fn bookings_for(&self, user: &UserId) -> Vec<Booking> {
        let mut list: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| &b.user_id == user)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn find_by_payment_ref(&self, payment_ref: &str) -> Option<Booking> {
        self.bookings
            .read()
            .await
            .values()
            .find(|b| b.payment_ref == payment_ref)
            .cloned()
    }

    /// Очередь возвратов для администратора, старые запросы первыми.
    pub async fn pending_refunds(&self) -> Vec<Booking> {
        let mut list: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == BookingStatus::RefundRequested)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        list
    }

    pub async fn has_live_bookings(&self, showtime_ids: &[ShowtimeId]) -> bool {
        self.bookings
            .read()
            .await
            .values()
            .any(|b| b.status.occupies_seats() && showtime_ids.contains(&b.showtime_id))
    }

    /// Владелец просит вернуть деньги. Места остаются занятыми до решения.
    pub async fn request_refund(&self, id: BookingId, user: &UserId) -> Result<Booking, AppError> {
        let _transition = self.transitions.lock().await;
        let booking = self.get(id).await?;

        if &booking.user_id != user {
            return Err(AppError::Unauthorized(format!("booking {id} belongs to another user")));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::InvalidTransition(format!(
                "refund can only be requested for a confirmed booking, {id} is {}",
                booking.status
            )));
        }

        let now = self.clock.now();
        self.repo.update_booking_status(id, BookingStatus::RefundRequested, now).await?;

        let mut updated = booking;
        updated.status = BookingStatus::RefundRequested;
        updated.updated_at = now;
        self.bookings.write().await.insert(id, updated.clone());

        info!("Refund requested for booking {} by {}", id, user);
        Ok(updated)
    }

    /// Решение по возврату. При одобрении места возвращаются в продажу.
    pub async fn resolve_refund(&self, id: BookingId, approve: bool) -> Result<Booking, AppError> {
        let _transition = self.transitions.lock().await;
        let booking = self.get(id).await?;

        if booking.status != BookingStatus::RefundRequested {
            return Err(AppError::InvalidTransition(format!(
                "booking {id} has no pending refund request (status {})",
                booking.status
            )));
        }

        let updated = if approve {
            self.inventory.release_booking(&booking).await?
        } else {
            let now = self.clock.now();
            self.repo.update_booking_status(id, BookingStatus::Confirmed, now).await?;
            let mut restored = booking;
            restored.status = BookingStatus::Confirmed;
            restored.updated_at = now;
            restored
        };
        self.bookings.write().await.insert(id, updated.clone());

        info!(
            "Refund for booking {} {}",
            id,
            if approve { "approved" } else { "rejected" }
        );
        Ok(updated)
    }
}
