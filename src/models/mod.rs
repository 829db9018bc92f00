pub mod ids;
pub mod seat;
pub mod show;
pub mod showtime;
pub mod hold;
pub mod booking;

pub use ids::{BookingId, HoldId, ShowId, ShowtimeId, UserId};
pub use seat::{SeatCoord, SeatLabelError, SeatState};
pub use show::{NewShow, SeatingConfig, Show, ShowUpdate};
pub use showtime::{SeatMapView, Showtime};
pub use hold::SeatHold;
pub use booking::{Booking, BookingStatus, PriceBreakdown};

/// Денежная сумма в минимальных единицах валюты (пайсы, копейки).
pub type Money = i64;
