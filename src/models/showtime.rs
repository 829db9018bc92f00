use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SeatCoord, SeatState, ShowId, ShowtimeId};

/// Сеанс: (локация, дата, время) внутри шоу со своей сеткой мест.
///
/// Размеры сетки фиксируются в момент создания и дальше не меняются.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub show_id: ShowId,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub rows: u32,
    pub columns: u32,
    pub created_at: DateTime<Utc>,
}

impl Showtime {
    /// Совпадает ли сеанс по (локация, дата, время). Локация сравнивается без учёта регистра.
    pub fn same_slot(&self, location: &str, date: NaiveDate, time: NaiveTime) -> bool {
        self.location.eq_ignore_ascii_case(location.trim()) && self.date == date && self.time == time
    }
}

/// Схема зала для клиента: по строке на ряд.
#[derive(Debug, Clone, Serialize)]
pub struct SeatMapView {
    pub showtime_id: ShowtimeId,
    pub rows: u32,
    pub columns: u32,
    pub seats: Vec<Vec<SeatState>>,
    pub free: u64,
    pub held: u64,
    pub occupied: u64,
}

impl SeatMapView {
    pub fn state_of(&self, seat: SeatCoord) -> Option<SeatState> {
        let row = self.seats.get(seat.row.checked_sub(1)? as usize)?;
        row.get(seat.column.checked_sub(1)? as usize).copied()
    }
}
