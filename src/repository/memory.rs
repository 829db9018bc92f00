use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{Repository, StorageError};
use crate::models::{Booking, BookingId, BookingStatus, HoldId, SeatHold, Show, ShowId, Showtime, ShowtimeId};

#[derive(Default)]
struct Tables {
    shows: HashMap<ShowId, Show>,
    showtimes: HashMap<ShowtimeId, Showtime>,
    holds: HashMap<HoldId, SeatHold>,
    bookings: HashMap<BookingId, Booking>,
}

/// Репозиторий в памяти: для тестов и локального запуска без Postgres (`STORAGE_BACKEND=memory`).
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Все последующие записи будут падать с `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn holds(&self) -> Vec<SeatHold> {
        self.tables().holds.values().cloned().collect()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables().bookings.values().cloned().collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writable(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(self.tables())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_show(&self, show: &Show) -> Result<(), StorageError> {
        self.writable()?.shows.insert(show.id, show.clone());
        Ok(())
    }

    async fn update_show(&self, show: &Show) -> Result<(), StorageError> {
        self.writable()?.shows.insert(show.id, show.clone());
        Ok(())
    }

    async fn delete_show(&self, id: ShowId) -> Result<(), StorageError> {
        let mut tables = self.writable()?;
        tables.shows.remove(&id);
        let removed: Vec<ShowtimeId> = tables
            .showtimes
            .values()
            .filter(|st| st.show_id == id)
            .map(|st| st.id)
            .collect();
        for showtime_id in &removed {
            tables.showtimes.remove(showtime_id);
        }
        tables.holds.retain(|_, hold| !removed.contains(&hold.showtime_id));
        Ok(())
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> Result<(), StorageError> {
        self.writable()?.showtimes.insert(showtime.id, showtime.clone());
        Ok(())
    }

    async fn load_catalog(&self) -> Result<(Vec<Show>, Vec<Showtime>), StorageError> {
        let tables = self.tables();
        Ok((
            tables.shows.values().cloned().collect(),
            tables.showtimes.values().cloned().collect(),
        ))
    }

    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), StorageError> {
        self.writable()?.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn delete_holds(&self, ids: &[HoldId]) -> Result<(), StorageError> {
        let mut tables = self.writable()?;
        for id in ids {
            tables.holds.remove(id);
        }
        Ok(())
    }

    async fn promote_hold(&self, hold_id: HoldId, booking: &Booking) -> Result<(), StorageError> {
        let mut tables = self.writable()?;
        if tables.bookings.values().any(|b| b.payment_ref == booking.payment_ref) {
            return Err(StorageError::DuplicatePaymentRef(booking.payment_ref.clone()));
        }
        tables.holds.remove(&hold_id);
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn load_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<SeatHold>, StorageError> {
        let mut tables = self.tables();
        tables.holds.retain(|_, hold| hold.is_active_at(now));
        Ok(tables.holds.values().cloned().collect())
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tables = self.writable()?;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or_else(|| StorageError::Corrupt(format!("booking {id} missing")))?;
        booking.status = status;
        booking.updated_at = at;
        Ok(())
    }

    async fn load_bookings(&self) -> Result<Vec<Booking>, StorageError> {
        Ok(self.tables().bookings.values().cloned().collect())
    }
}
