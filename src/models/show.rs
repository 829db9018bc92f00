use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Money, ShowId, UserId};
use crate::error::AppError;

/// Ряды до `ZZ`.
pub const MAX_ROWS: u32 = 702;
pub const MAX_COLUMNS: u32 = 100;
/// Потолок цены места в минимальных единицах, чтобы итог заказа гарантированно влезал в `i64`.
pub const MAX_SEAT_PRICE: Money = 1_000_000_000_000;

/// Конфигурация зала: размеры сетки и ценовые зоны.
///
/// Ряды `1..=low_price_rows` продаются по `low_price`, остальные по `high_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingConfig {
    pub rows: u32,
    pub columns: u32,
    pub low_price_rows: u32,
    pub low_price: Money,
    pub high_price: Money,
}

impl SeatingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rows == 0 || self.columns == 0 || self.low_price_rows == 0 {
            return Err(AppError::InvalidSpec(
                "rows, columns and low_price_rows must be positive".to_string(),
            ));
        }
        if self.rows > MAX_ROWS || self.columns > MAX_COLUMNS {
            return Err(AppError::InvalidSpec(format!(
                "seating grid {}x{} exceeds the {MAX_ROWS}x{MAX_COLUMNS} limit",
                self.rows, self.columns
            )));
        }
        if self.low_price <= 0 || self.high_price <= 0 {
            return Err(AppError::InvalidSpec("prices must be positive".to_string()));
        }
        if self.low_price > MAX_SEAT_PRICE || self.high_price > MAX_SEAT_PRICE {
            return Err(AppError::InvalidSpec(format!("seat price must not exceed {MAX_SEAT_PRICE}")));
        }
        if self.low_price_rows > self.rows {
            return Err(AppError::InvalidSpec(format!(
                "low_price_rows ({}) exceeds row count ({})",
                self.low_price_rows, self.rows
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: ShowId,
    pub provider_id: UserId,
    pub title: String,
    pub release_date: NaiveDate,
    pub rating: f32,
    pub poster_url: Option<String>,
    pub seating: SeatingConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Show {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.provider_id == user
    }
}

/// Данные для создания шоу. Провайдер берётся из токена, а не из тела запроса.
#[derive(Debug, Clone, Deserialize)]
pub struct NewShow {
    pub title: String,
    pub release_date: NaiveDate,
    pub rating: f32,
    pub poster_url: Option<String>,
    pub seating: SeatingConfig,
}

impl NewShow {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_title(&self.title)?;
        validate_rating(self.rating)?;
        self.seating.validate()
    }
}

/// Частичное обновление шоу; `None` означает "оставить как есть".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowUpdate {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub rating: Option<f32>,
    pub poster_url: Option<String>,
    pub seating: Option<SeatingConfig>,
}

impl ShowUpdate {
    /// Применяет изменения к копии шоу. Проверка размеров сетки делается в каталоге,
    /// т.к. зависит от наличия сеансов.
    pub fn apply_to(&self, show: &Show) -> Result<Show, AppError> {
        let mut updated = show.clone();
        if let Some(title) = &self.title {
            validate_title(title)?;
            updated.title = title.trim().to_string();
        }
        if let Some(date) = self.release_date {
            updated.release_date = date;
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
            updated.rating = rating;
        }
        if let Some(url) = &self.poster_url {
            updated.poster_url = Some(url.clone());
        }
        if let Some(seating) = self.seating {
            seating.validate()?;
            updated.seating = seating;
        }
        Ok(updated)
    }
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::InvalidSpec("title must not be empty".to_string()));
    }
    Ok(())
}

fn validate_rating(rating: f32) -> Result<(), AppError> {
    if !(0.0..=10.0).contains(&rating) {
        return Err(AppError::InvalidSpec(format!(
            "rating must be between 0 and 10, got {rating}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SeatingConfig {
        SeatingConfig { rows: 5, columns: 4, low_price_rows: 2, low_price: 100, high_price: 200 }
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let mut cfg = config();
        cfg.columns = 0;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));

        let mut cfg = config();
        cfg.low_price = 0;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));
    }

    #[test]
    fn rejects_oversized_grid_and_prices() {
        let mut cfg = config();
        cfg.rows = MAX_ROWS;
        cfg.columns = MAX_COLUMNS;
        assert!(cfg.validate().is_ok());

        cfg.rows = MAX_ROWS + 1;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));

        let mut cfg = config();
        cfg.columns = 100_000;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));

        let mut cfg = config();
        cfg.high_price = Money::MAX / 10;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));
        cfg.high_price = MAX_SEAT_PRICE;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_threshold_beyond_rows() {
        let mut cfg = config();
        cfg.low_price_rows = 6;
        assert!(matches!(cfg.validate(), Err(AppError::InvalidSpec(_))));

        cfg.low_price_rows = 5;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn update_rejects_bad_rating() {
        let now = Utc::now();
        let show = Show {
            id: ShowId::new(),
            provider_id: UserId::from("p1"),
            title: "Dune".to_string(),
            release_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            rating: 8.1,
            poster_url: None,
            seating: config(),
            created_at: now,
            updated_at: now,
        };

        let patch = ShowUpdate { rating: Some(11.0), ..Default::default() };
        assert!(matches!(patch.apply_to(&show), Err(AppError::InvalidSpec(_))));

        let patch = ShowUpdate { title: Some("  Dune: Part Two ".into()), ..Default::default() };
        assert_eq!(patch.apply_to(&show).unwrap().title, "Dune: Part Two");
    }
}
