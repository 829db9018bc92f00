use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{BookingId, Money, SeatCoord, ShowId, ShowtimeId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub ticket_cost: Money,
    pub platform_fee: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    RefundRequested,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::RefundRequested => "refund_requested",
            BookingStatus::Refunded => "refunded",
        }
    }

    /// Места заняты, пока бронь не возвращена.
    pub fn occupies_seats(&self) -> bool {
        !matches!(self, BookingStatus::Refunded)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "refund_requested" => Ok(BookingStatus::RefundRequested),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(format!("unknown booking status `{other}`")),
        }
    }
}

/// Подтверждённое оплаченное бронирование. Не удаляется: возврат меняет только статус.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub show_id: ShowId,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatCoord>,
    pub price: PriceBreakdown,
    pub payment_ref: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [BookingStatus::Confirmed, BookingStatus::RefundRequested, BookingStatus::Refunded] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("paid".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn refunded_bookings_release_seats() {
        assert!(BookingStatus::Confirmed.occupies_seats());
        assert!(BookingStatus::RefundRequested.occupies_seats());
        assert!(!BookingStatus::Refunded.occupies_seats());
    }
}
