use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{
    Booking, BookingId, HoldId, SeatCoord, SeatHold, SeatMapView, SeatState, Showtime, ShowtimeId,
};

/// Кто занимает место. Свободные места в карте отсутствуют.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Held(HoldId),
    Booked(BookingId),
}

/// Состояние мест одного сеанса. Вся синхронизация снаружи (mutex на сеанс),
/// здесь только чистая логика над индексом "координата -> владелец".
#[derive(Debug)]
pub struct ShowtimeSeats {
    showtime_id: ShowtimeId,
    rows: u32,
    columns: u32,
    claims: HashMap<SeatCoord, Claim>,
    holds: HashMap<HoldId, SeatHold>,
    retired: bool,
}

impl ShowtimeSeats {
    pub fn new(showtime: &Showtime) -> Self {
        Self {
            showtime_id: showtime.id,
            rows: showtime.rows,
            columns: showtime.columns,
            claims: HashMap::new(),
            holds: HashMap::new(),
            retired: false,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn set_retired(&mut self, retired: bool) {
        self.retired = retired;
    }

    pub fn in_bounds(&self, seat: SeatCoord) -> bool {
        (1..=self.rows).contains(&seat.row) && (1..=self.columns).contains(&seat.column)
    }

    pub fn out_of_bounds(&self, seats: &[SeatCoord]) -> Vec<SeatCoord> {
        seats.iter().copied().filter(|s| !self.in_bounds(*s)).collect()
    }

    /// Места из запроса, уже занятые холдом или бронью.
    pub fn conflicts(&self, seats: &[SeatCoord]) -> Vec<SeatCoord> {
        seats.iter().copied().filter(|s| self.claims.contains_key(s)).collect()
    }

    pub fn claim_of(&self, seat: SeatCoord) -> Option<Claim> {
        self.claims.get(&seat).copied()
    }

    pub fn hold(&self, id: HoldId) -> Option<&SeatHold> {
        self.holds.get(&id)
    }

    pub fn expired_holds(&self, now: DateTime<Utc>) -> Vec<HoldId> {
        self.holds
            .values()
            .filter(|h| !h.is_active_at(now))
            .map(|h| h.id)
            .collect()
    }

    /// Есть ли активные холды или живые брони.
    pub fn has_live_claims(&self) -> bool {
        !self.claims.is_empty()
    }

    /// Вызывающий обязан заранее проверить `conflicts`.
    pub fn apply_hold(&mut self, hold: SeatHold) {
        debug_assert!(self.conflicts(&hold.seats).is_empty());
        for seat in &hold.seats {
            self.claims.insert(*seat, Claim::Held(hold.id));
        }
        self.holds.insert(hold.id, hold);
    }

    pub fn remove_hold(&mut self, id: HoldId) -> Option<SeatHold> {
        let hold = self.holds.remove(&id)?;
        for seat in &hold.seats {
            if self.claims.get(seat) == Some(&Claim::Held(id)) {
                self.claims.remove(seat);
            }
        }
        Some(hold)
    }

    /// Переводит места холда в проданные.
    pub fn promote(&mut self, hold_id: HoldId, booking: &Booking) {
        self.holds.remove(&hold_id);
        self.apply_booking(booking);
    }

    pub fn apply_booking(&mut self, booking: &Booking) {
        for seat in &booking.seats {
            self.claims.insert(*seat, Claim::Booked(booking.id));
        }
    }

    /// Освобождает места брони (после одобренного возврата).
    pub fn release_booking(&mut self, booking: &Booking) -> usize {
        let mut released = 0;
        for seat in &booking.seats {
            if self.claims.get(seat) == Some(&Claim::Booked(booking.id)) {
                self.claims.remove(seat);
                released += 1;
            }
        }
        released
    }

    pub fn view(&self) -> SeatMapView {
        let mut free = 0;
        let mut held = 0;
        let mut occupied = 0;

        let seats = (1..=self.rows)
            .map(|row| {
                (1..=self.columns)
                    .map(|column| match self.claims.get(&SeatCoord::new(row, column)) {
                        None => {
                            free += 1;
                            SeatState::Free
                        }
                        Some(Claim::Held(_)) => {
                            held += 1;
                            SeatState::Held
                        }
                        Some(Claim::Booked(_)) => {
                            occupied += 1;
                            SeatState::Occupied
                        }
                    })
                    .collect()
            })
            .collect();

        SeatMapView {
            showtime_id: self.showtime_id,
            rows: self.rows,
            columns: self.columns,
            seats,
            free,
            held,
            occupied,
        }
    }
}
