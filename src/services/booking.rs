//! Координатор бронирования: связывает каталог, движок мест, журнал броней и платёжный шлюз.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::CatalogStore;
use crate::error::AppError;
use crate::inventory::SeatInventory;
use crate::ledger::BookingLedger;
use crate::models::{
    Booking, BookingId, HoldId, NewShow, SeatCoord, SeatHold, SeatMapView, Show, ShowId, ShowUpdate, Showtime,
    ShowtimeId, UserId,
};
use crate::services::payment::{PaymentGateway, PaymentVerdict};

pub struct BookingService {
    catalog: Arc<CatalogStore>,
    inventory: Arc<SeatInventory>,
    ledger: Arc<BookingLedger>,
    payments: Arc<dyn PaymentGateway>,
    hold_ttl: Duration,
}

impl BookingService {
    pub fn new(
        catalog: Arc<CatalogStore>,
        inventory: Arc<SeatInventory>,
        ledger: Arc<BookingLedger>,
        payments: Arc<dyn PaymentGateway>,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            inventory,
            ledger,
            payments,
            hold_ttl,
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    // --- каталог ---

    pub async fn create_show(&self, provider: &UserId, draft: NewShow) -> Result<Show, AppError> {
        self.catalog.create_show(provider, draft).await
    }

    pub async fn update_show(&self, id: ShowId, provider: &UserId, patch: ShowUpdate) -> Result<Show, AppError> {
        self.catalog.update_show(id, provider, patch).await
    }

    pub async fn add_showtime(
        &self,
        show_id: ShowId,
        provider: &UserId,
        location: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Showtime, AppError> {
        self.catalog.add_showtime(show_id, provider, location, date, time).await
    }

    /// Удаляет шоу, если ни на одном его сеансе нет холдов и живых броней.
    pub async fn delete_show(&self, id: ShowId, provider: &UserId) -> Result<(), AppError> {
        let show = self.catalog.get_show(id).await?;
        if !show.is_owned_by(provider) {
            return Err(AppError::Unauthorized(format!("show {id} belongs to another provider")));
        }

        let showtime_ids: Vec<ShowtimeId> = self.catalog.showtimes_of(id).await.iter().map(|st| st.id).collect();
        if self.ledger.has_live_bookings(&showtime_ids).await {
            return Err(AppError::InvalidTransition(format!("show {id} has live bookings")));
        }

        self.inventory.retire_showtimes(&showtime_ids).await?;
        match self.catalog.delete_show(id, provider).await {
            Ok(removed) => {
                self.inventory.forget_showtimes(&removed).await;
                Ok(())
            }
            Err(e) => {
                self.inventory.reinstate_showtimes(&showtime_ids).await;
                Err(e)
            }
        }
    }

    // --- места ---

    pub async fn seat_map(&self, showtime_id: ShowtimeId) -> Result<SeatMapView, AppError> {
        self.inventory.seat_map(showtime_id).await
    }

    pub async fn hold_seats(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatCoord],
        user: &UserId,
    ) -> Result<SeatHold, AppError> {
        self.inventory.hold_seats(showtime_id, seats, user, self.hold_ttl).await
    }

    pub async fn get_hold(&self, hold_id: HoldId, user: &UserId) -> Result<SeatHold, AppError> {
        self.inventory.get_hold(hold_id, user).await
    }

    pub async fn release_hold(&self, hold_id: HoldId, user: &UserId) -> Result<(), AppError> {
        self.inventory.release_hold(hold_id, user).await
    }

    /// Подтверждает холд после проверки оплаты.
    pub async fn confirm_booking(
        &self,
        hold_id: HoldId,
        user: &UserId,
        payment_ref: &str,
    ) -> Result<Booking, AppError> {
        let payment_ref = payment_ref.trim();
        if payment_ref.is_empty() {
            return Err(AppError::InvalidSpec("payment reference is required".to_string()));
        }

        // Проверяем холд до похода в шлюз, чтобы не списывать деньги за истёкший холд.
        let hold = match self.inventory.get_hold(hold_id, user).await {
            Err(AppError::NotFound { .. }) => return Err(AppError::HoldExpired { hold_id }),
            other => other?,
        };

        if let Some(existing) = self.ledger.find_by_payment_ref(payment_ref).await {
            return Err(AppError::InvalidTransition(format!(
                "payment {payment_ref} is already used by booking {}",
                existing.id
            )));
        }

        match self.payments.confirm_payment(payment_ref, hold.quote.total).await {
            Ok(PaymentVerdict::Confirmed) => {}
            Ok(PaymentVerdict::Declined { reason }) => {
                info!("Payment {} for hold {} declined: {}", payment_ref, hold_id, reason);
                return Err(AppError::PaymentDeclined(reason));
            }
            Err(e) => return Err(AppError::PaymentUnavailable(e.to_string())),
        }

        let booking = match self.inventory.confirm_booking(hold_id, user, payment_ref).await {
            Ok(booking) => booking,
            Err(e) => {
                warn!("Payment {} confirmed but hold {} could not be promoted: {}", payment_ref, hold_id, e);
                return Err(e);
            }
        };
        self.ledger.record_booking(booking.clone()).await?;
        Ok(booking)
    }

    // --- брони ---

    pub async fn bookings_for(&self, user: &UserId) -> Vec<Booking> {
        self.ledger.bookings_for(user).await
    }

    /// Бронь видна владельцу и администратору.
    pub async fn get_booking(&self, id: BookingId, user: &UserId, is_admin: bool) -> Result<Booking, AppError> {
        let booking = self.ledger.get(id).await?;
        if !is_admin && &booking.user_id != user {
            return Err(AppError::Unauthorized(format!("booking {id} belongs to another user")));
        }
        Ok(booking)
    }

    pub async fn pending_refunds(&self) -> Vec<Booking> {
        self.ledger.pending_refunds().await
    }

    pub async fn request_refund(&self, id: BookingId, user: &UserId) -> Result<Booking, AppError> {
        self.ledger.request_refund(id, user).await
    }

    pub async fn resolve_refund(&self, id: BookingId, approve: bool) -> Result<Booking, AppError> {
        self.ledger.resolve_refund(id, approve).await
    }
}
