use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HoldId, PriceBreakdown, SeatCoord, ShowId, ShowtimeId, UserId};

/// Временная блокировка мест до оплаты.
///
/// `quote` - цена, посчитанная в момент блокировки; именно эту сумму
/// должен подтвердить платёжный шлюз.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatHold {
    pub id: HoldId,
    pub show_id: ShowId,
    pub showtime_id: ShowtimeId,
    pub holder_id: UserId,
    pub seats: Vec<SeatCoord>,
    pub quote: PriceBreakdown,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatHold {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
