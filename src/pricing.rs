//! Расчёт стоимости билетов.
//!
//! Чистые функции без состояния: цена места зависит только от номера ряда
//! и ценовой зоны шоу, итог - от суммы цен мест, фиксированного сбора и налога.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Money, PriceBreakdown, SeatCoord, SeatingConfig};

/// Сервисный сбор по умолчанию: 40.00 в минимальных единицах.
pub const DEFAULT_PLATFORM_FEE: Money = 4_000;
/// GST, проценты от стоимости билетов.
pub const DEFAULT_TAX_PERCENT: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub platform_fee: Money,
    pub tax_percent: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            platform_fee: DEFAULT_PLATFORM_FEE,
            tax_percent: DEFAULT_TAX_PERCENT,
        }
    }
}

/// Цена места в ряду `row` (ряды с единицы).
pub fn price_for_seat(row: u32, seating: &SeatingConfig) -> Money {
    if row <= seating.low_price_rows {
        seating.low_price
    } else {
        seating.high_price
    }
}

/// Итог по ценам мест. Переполнение `i64` - `InvalidSpec`, а не паника.
pub fn compute_total(seat_prices: &[Money], policy: &PricingPolicy) -> Result<PriceBreakdown, AppError> {
    let ticket_cost = seat_prices
        .iter()
        .try_fold(0 as Money, |acc, price| acc.checked_add(*price))
        .ok_or_else(overflow)?;
    let tax = percent_of(ticket_cost, policy.tax_percent).ok_or_else(overflow)?;
    let total = ticket_cost
        .checked_add(policy.platform_fee)
        .and_then(|sum| sum.checked_add(tax))
        .ok_or_else(overflow)?;

    Ok(PriceBreakdown {
        ticket_cost,
        platform_fee: policy.platform_fee,
        tax,
        total,
    })
}

/// Котировка для набора мест.
pub fn quote(seats: &[SeatCoord], seating: &SeatingConfig, policy: &PricingPolicy) -> Result<PriceBreakdown, AppError> {
    let prices: Vec<Money> = seats.iter().map(|s| price_for_seat(s.row, seating)).collect();
    compute_total(&prices, policy)
}

// округление половины вверх до минимальной единицы
fn percent_of(amount: Money, percent: u32) -> Option<Money> {
    let scaled = amount.checked_mul(Money::from(percent))?.checked_add(50)?;
    Some(scaled.div_euclid(100))
}

fn overflow() -> AppError {
    AppError::InvalidSpec("order total does not fit into the money range".to_string())
}
