//! Движок учёта мест.
//!
//! Каждый сеанс имеет собственный `tokio::sync::Mutex` над картой мест, поэтому
//! конкурентные запросы на разные сеансы не мешают друг другу, а внутри сеанса
//! захват мест - атомарный check-and-set: либо все запрошенные места, либо ни одного.
//!
//! Порядок работы под блокировкой сеанса всегда один: проверка -> запись в репозиторий ->
//! изменение памяти. Если запись упала, карта мест не меняется.
//!
//! Порядок захвата блокировок: мьютекс сеанса, затем `hold_index`. Наоборот нельзя.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{
    Booking, BookingId, BookingStatus, HoldId, SeatCoord, SeatHold, SeatMapView, ShowtimeId, UserId,
};
use crate::pricing::{self, PricingPolicy};
use crate::repository::{Repository, StorageError};

pub mod seat_map;

pub use seat_map::{Claim, ShowtimeSeats};

type Slot = Arc<Mutex<ShowtimeSeats>>;

pub struct SeatInventory {
    catalog: Arc<CatalogStore>,
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    pricing: PricingPolicy,
    max_seats_per_hold: usize,
    showtimes: RwLock<HashMap<ShowtimeId, Slot>>,
    hold_index: RwLock<HashMap<HoldId, ShowtimeId>>,
}

impl SeatInventory {
    pub fn new(
        catalog: Arc<CatalogStore>,
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        pricing: PricingPolicy,
        max_seats_per_hold: usize,
    ) -> Self {
        Self {
            catalog,
            repo,
            clock,
            pricing,
            max_seats_per_hold,
            showtimes: RwLock::new(HashMap::new()),
            hold_index: RwLock::new(HashMap::new()),
        }
    }

    // Карта мест сеанса; создаётся лениво по размерам из каталога.
    async fn slot(&self, showtime_id: ShowtimeId) -> Result<Slot, AppError> {
        if let Some(slot) = self.showtimes.read().await.get(&showtime_id) {
            return Ok(slot.clone());
        }

        let showtime = self.catalog.get_showtime(showtime_id).await?;
        let mut showtimes = self.showtimes.write().await;
        let slot = showtimes
            .entry(showtime_id)
            .or_insert_with(|| Arc::new(Mutex::new(ShowtimeSeats::new(&showtime))));
        Ok(slot.clone())
    }

    async fn existing_slot(&self, showtime_id: ShowtimeId) -> Option<Slot> {
        self.showtimes.read().await.get(&showtime_id).cloned()
    }

    async fn lookup_hold(&self, hold_id: HoldId) -> Option<ShowtimeId> {
        self.hold_index.read().await.get(&hold_id).copied()
    }

    /// Снимает просроченные холды сеанса. Вызывается под мьютексом сеанса.
    async fn expire_locked(&self, seats: &mut ShowtimeSeats) -> Vec<SeatHold> {
        let now = self.clock.now();
        let expired = seats.expired_holds(now);
        if expired.is_empty() {
            return Vec::new();
        }

        // Просроченный холд не блокирует места даже если удаление из БД не прошло:
        // при старте такие строки отфильтруются по expires_at.
        if let Err(e) = self.repo.delete_holds(&expired).await {
            warn!("Failed to delete {} expired holds from storage: {}", expired.len(), e);
        }

        let mut released = Vec::with_capacity(expired.len());
        let mut index = self.hold_index.write().await;
        for id in expired {
            index.remove(&id);
            if let Some(hold) = seats.remove_hold(id) {
                debug!("Hold {} expired, {} seats released", id, hold.seats.len());
                released.push(hold);
            }
        }
        released
    }

    /// Атомарно блокирует места сеанса для `holder` на `ttl`.
    ///
    /// Все места или ни одного: при любом конфликте возвращается `SeatUnavailable`
    /// со списком занятых мест.
    pub async fn hold_seats(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatCoord],
        holder: &UserId,
        ttl: Duration,
    ) -> Result<SeatHold, AppError> {
        let mut requested = seats.to_vec();
        requested.sort();
        requested.dedup();

        if requested.is_empty() {
            return Err(AppError::InvalidSpec("at least one seat is required".to_string()));
        }
        if requested.len() > self.max_seats_per_hold {
            return Err(AppError::InvalidSpec(format!(
                "at most {} seats per hold, requested {}",
                self.max_seats_per_hold,
                requested.len()
            )));
        }
        if ttl <= Duration::zero() {
            return Err(AppError::InvalidSpec("hold ttl must be positive".to_string()));
        }

        let showtime = self.catalog.get_showtime(showtime_id).await?;
        let show = self.catalog.get_show(showtime.show_id).await?;
        let slot = self.slot(showtime_id).await?;

        let mut map = slot.lock().await;
        if map.is_retired() {
            return Err(AppError::not_found("showtime", showtime_id));
        }
        self.expire_locked(&mut map).await;

        let outside = map.out_of_bounds(&requested);
        if !outside.is_empty() {
            let labels: Vec<String> = outside.iter().map(SeatCoord::to_string).collect();
            return Err(AppError::InvalidSpec(format!(
                "seats {} are outside the {}x{} grid",
                labels.join(", "),
                showtime.rows,
                showtime.columns
            )));
        }

        let conflicts = map.conflicts(&requested);
        if !conflicts.is_empty() {
            debug!("Hold rejected on showtime {}: {} seats taken", showtime_id, conflicts.len());
            return Err(AppError::SeatUnavailable { conflicts });
        }

        let now = self.clock.now();
        let hold = SeatHold {
            id: HoldId::new(),
            show_id: show.id,
            showtime_id,
            holder_id: holder.clone(),
            quote: pricing::quote(&requested, &show.seating, &self.pricing)?,
            seats: requested,
            created_at: now,
            expires_at: now + ttl,
        };

        self.repo.insert_hold(&hold).await?;
        map.apply_hold(hold.clone());
        self.hold_index.write().await.insert(hold.id, showtime_id);

        info!(
            "Hold {} granted on showtime {}: {} seats for {} until {}",
            hold.id,
            showtime_id,
            hold.seats.len(),
            holder,
            hold.expires_at
        );
        Ok(hold)
    }

    /// Снимает холд. Идемпотентно: неизвестный, снятый или просроченный холд - no-op.
    pub async fn release_hold(&self, hold_id: HoldId, holder: &UserId) -> Result<(), AppError> {
        let Some(showtime_id) = self.lookup_hold(hold_id).await else {
            return Ok(());
        };
        let Some(slot) = self.existing_slot(showtime_id).await else {
            return Ok(());
        };

        let mut map = slot.lock().await;
        let Some(hold) = map.hold(hold_id) else {
            return Ok(());
        };
        if !hold.is_active_at(self.clock.now()) {
            self.expire_locked(&mut map).await;
            return Ok(());
        }
        if &hold.holder_id != holder {
            return Err(AppError::Unauthorized(format!("hold {hold_id} belongs to another user")));
        }

        self.repo.delete_holds(&[hold_id]).await?;
        map.remove_hold(hold_id);
        self.hold_index.write().await.remove(&hold_id);

        info!("Hold {} released by {}", hold_id, holder);
        Ok(())
    }

    /// Обходит все сеансы и снимает истёкшие холды.
    pub async fn expire_holds(&self) -> Vec<SeatHold> {
        let slots: Vec<Slot> = self.showtimes.read().await.values().cloned().collect();

        let mut released = Vec::new();
        for slot in slots {
            let mut map = slot.lock().await;
            released.extend(self.expire_locked(&mut map).await);
        }

        if !released.is_empty() {
            info!("🧹 Expired {} seat holds", released.len());
        }
        released
    }

    /// Активный холд по id. Для клиента: посмотреть места и сумму к оплате.
    pub async fn get_hold(&self, hold_id: HoldId, holder: &UserId) -> Result<SeatHold, AppError> {
        let slot = match self.lookup_hold(hold_id).await {
            Some(showtime_id) => self.existing_slot(showtime_id).await,
            None => None,
        }
        .ok_or_else(|| AppError::not_found("hold", hold_id))?;

        let map = slot.lock().await;
        let hold = map.hold(hold_id).ok_or_else(|| AppError::not_found("hold", hold_id))?;
        if &hold.holder_id != holder {
            return Err(AppError::Unauthorized(format!("hold {hold_id} belongs to another user")));
        }
        if !hold.is_active_at(self.clock.now()) {
            return Err(AppError::HoldExpired { hold_id });
        }
        Ok(hold.clone())
    }

    /// Превращает активный холд в подтверждённую бронь.
    ///
    /// Холд, которого больше нет (истёк, снят, уже подтверждён), даёт `HoldExpired`:
    /// клиенту в любом случае нужно заново выбрать места.
    pub async fn confirm_booking(
        &self,
        hold_id: HoldId,
        holder: &UserId,
        payment_ref: &str,
    ) -> Result<Booking, AppError> {
        let Some(showtime_id) = self.lookup_hold(hold_id).await else {
            return Err(AppError::HoldExpired { hold_id });
        };
        let Some(slot) = self.existing_slot(showtime_id).await else {
            return Err(AppError::HoldExpired { hold_id });
        };

        let mut map = slot.lock().await;
        let Some(hold) = map.hold(hold_id).cloned() else {
            return Err(AppError::HoldExpired { hold_id });
        };
        if &hold.holder_id != holder {
            return Err(AppError::Unauthorized(format!("hold {hold_id} belongs to another user")));
        }

        let now = self.clock.now();
        if !hold.is_active_at(now) {
            self.expire_locked(&mut map).await;
            info!("Confirmation of hold {} rejected: expired at {}", hold_id, hold.expires_at);
            return Err(AppError::HoldExpired { hold_id });
        }

        let booking = Booking {
            id: BookingId::new(),
            user_id: hold.holder_id.clone(),
            show_id: hold.show_id,
            showtime_id,
            seats: hold.seats.clone(),
            price: hold.quote,
            payment_ref: payment_ref.to_string(),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        match self.repo.promote_hold(hold_id, &booking).await {
            Ok(()) => {}
            Err(StorageError::DuplicatePaymentRef(payment_ref)) => {
                return Err(AppError::InvalidTransition(format!(
                    "payment {payment_ref} is already used by another booking"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        map.promote(hold_id, &booking);
        self.hold_index.write().await.remove(&hold_id);

        info!(
            "Hold {} promoted to booking {} ({} seats, total {})",
            hold_id,
            booking.id,
            booking.seats.len(),
            booking.price.total
        );
        Ok(booking)
    }

    /// Возвращает места брони в продажу и фиксирует статус `refunded`.
    pub async fn release_booking(&self, booking: &Booking) -> Result<Booking, AppError> {
        let now = self.clock.now();
        let mut refunded = booking.clone();
        refunded.status = BookingStatus::Refunded;
        refunded.updated_at = now;

        let slot = match self.slot(booking.showtime_id).await {
            Ok(slot) => slot,
            Err(AppError::NotFound { .. }) => {
                // сеанс уже удалён - освобождать нечего
                self.repo.update_booking_status(booking.id, BookingStatus::Refunded, now).await?;
                return Ok(refunded);
            }
            Err(e) => return Err(e),
        };

        let mut map = slot.lock().await;
        self.repo.update_booking_status(booking.id, BookingStatus::Refunded, now).await?;
        let released = map.release_booking(booking);

        info!("Booking {} refunded, {} seats back on sale", booking.id, released);
        Ok(refunded)
    }

    /// Схема зала с учётом активных холдов.
    pub async fn seat_map(&self, showtime_id: ShowtimeId) -> Result<SeatMapView, AppError> {
        let slot = self.slot(showtime_id).await?;
        let mut map = slot.lock().await;
        if map.is_retired() {
            return Err(AppError::not_found("showtime", showtime_id));
        }
        self.expire_locked(&mut map).await;
        Ok(map.view())
    }

    /// Помечает сеансы как снятые с продажи. Все или ни одного: если где-то есть
    /// активный холд или живая бронь - `InvalidTransition`.
    pub async fn retire_showtimes(&self, ids: &[ShowtimeId]) -> Result<(), AppError> {
        let mut ids = ids.to_vec();
        ids.sort();

        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            let slot = self.slot(*id).await?;
            guards.push((*id, slot.lock_owned().await));
        }

        for (id, map) in guards.iter_mut() {
            self.expire_locked(map).await;
            if map.has_live_claims() {
                return Err(AppError::InvalidTransition(format!(
                    "showtime {id} still has held or booked seats"
                )));
            }
        }

        for (_, map) in guards.iter_mut() {
            map.set_retired(true);
        }
        Ok(())
    }

    /// Откат `retire_showtimes`, если удаление из каталога не удалось.
    pub async fn reinstate_showtimes(&self, ids: &[ShowtimeId]) {
        for id in ids {
            if let Some(slot) = self.existing_slot(*id).await {
                slot.lock().await.set_retired(false);
            }
        }
    }

    /// Забывает карты мест удалённых сеансов.
    pub async fn forget_showtimes(&self, ids: &[ShowtimeId]) {
        let mut showtimes = self.showtimes.write().await;
        for id in ids {
            showtimes.remove(id);
        }
    }

    /// Восстанавливает занятость мест из репозитория при старте.
    pub async fn hydrate(&self, holds: Vec<SeatHold>, bookings: &[Booking]) -> Result<(), AppError> {
        let now = self.clock.now();
        let mut restored_bookings = 0;
        let mut restored_holds = 0;

        for booking in bookings.iter().filter(|b| b.status.occupies_seats()) {
            let slot = match self.slot(booking.showtime_id).await {
                Ok(slot) => slot,
                Err(AppError::NotFound { .. }) => {
                    warn!("Booking {} references unknown showtime {}", booking.id, booking.showtime_id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            slot.lock().await.apply_booking(booking);
            restored_bookings += 1;
        }

        for hold in holds.into_iter().filter(|h| h.is_active_at(now)) {
            let Ok(slot) = self.slot(hold.showtime_id).await else {
                warn!("Hold {} references unknown showtime {}", hold.id, hold.showtime_id);
                continue;
            };
            let mut map = slot.lock().await;
            if !map.conflicts(&hold.seats).is_empty() {
                warn!("Hold {} overlaps existing claims, dropping it", hold.id);
                continue;
            }
            let (id, showtime_id) = (hold.id, hold.showtime_id);
            map.apply_hold(hold);
            self.hold_index.write().await.insert(id, showtime_id);
            restored_holds += 1;
        }

        info!(
            "Seat inventory hydrated: {} bookings, {} active holds",
            restored_bookings, restored_holds
        );
        Ok(())
    }
}
