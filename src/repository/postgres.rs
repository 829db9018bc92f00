use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{Repository, StorageError};
use crate::database::Database;
use crate::models::{
    Booking, BookingId, BookingStatus, HoldId, PriceBreakdown, SeatCoord, SeatHold, SeatingConfig,
    Show, ShowId, Showtime, ShowtimeId, UserId,
};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

// --- строки таблиц ---

#[derive(FromRow)]
struct ShowRow {
    id: ShowId,
    provider_id: UserId,
    title: String,
    release_date: NaiveDate,
    rating: f32,
    poster_url: Option<String>,
    seat_rows: i32,
    seat_columns: i32,
    low_price_rows: i32,
    low_price: i64,
    high_price: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ShowtimeRow {
    id: ShowtimeId,
    show_id: ShowId,
    location: String,
    show_date: NaiveDate,
    show_time: NaiveTime,
    seat_rows: i32,
    seat_columns: i32,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct HoldRow {
    id: HoldId,
    show_id: ShowId,
    showtime_id: ShowtimeId,
    holder_id: UserId,
    seats: Json<Vec<SeatCoord>>,
    ticket_cost: i64,
    platform_fee: i64,
    tax: i64,
    total: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct BookingRow {
    id: BookingId,
    user_id: UserId,
    show_id: ShowId,
    showtime_id: ShowtimeId,
    seats: Json<Vec<SeatCoord>>,
    ticket_cost: i64,
    platform_fee: i64,
    tax: i64,
    total: i64,
    payment_ref: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn to_u32(value: i32, column: &str) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{column} = {value}")))
}

fn to_i32(value: u32) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{value} does not fit INT")))
}

impl TryFrom<ShowRow> for Show {
    type Error = StorageError;

    fn try_from(row: ShowRow) -> Result<Self, Self::Error> {
        Ok(Show {
            id: row.id,
            provider_id: row.provider_id,
            title: row.title,
            release_date: row.release_date,
            rating: row.rating,
            poster_url: row.poster_url,
            seating: SeatingConfig {
                rows: to_u32(row.seat_rows, "seat_rows")?,
                columns: to_u32(row.seat_columns, "seat_columns")?,
                low_price_rows: to_u32(row.low_price_rows, "low_price_rows")?,
                low_price: row.low_price,
                high_price: row.high_price,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ShowtimeRow> for Showtime {
    type Error = StorageError;

    fn try_from(row: ShowtimeRow) -> Result<Self, Self::Error> {
        Ok(Showtime {
            id: row.id,
            show_id: row.show_id,
            location: row.location,
            date: row.show_date,
            time: row.show_time,
            rows: to_u32(row.seat_rows, "seat_rows")?,
            columns: to_u32(row.seat_columns, "seat_columns")?,
            created_at: row.created_at,
        })
    }
}

impl From<HoldRow> for SeatHold {
    fn from(row: HoldRow) -> Self {
        SeatHold {
            id: row.id,
            show_id: row.show_id,
            showtime_id: row.showtime_id,
            holder_id: row.holder_id,
            seats: row.seats.0,
            quote: PriceBreakdown {
                ticket_cost: row.ticket_cost,
                platform_fee: row.platform_fee,
                tax: row.tax,
                total: row.total,
            },
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StorageError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            show_id: row.show_id,
            showtime_id: row.showtime_id,
            seats: row.seats.0,
            price: PriceBreakdown {
                ticket_cost: row.ticket_cost,
                platform_fee: row.platform_fee,
                tax: row.tax,
                total: row.total,
            },
            payment_ref: row.payment_ref,
            status: row.status.parse::<BookingStatus>().map_err(StorageError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_show(&self, show: &Show) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO shows (id, provider_id, title, release_date, rating, poster_url,
                               seat_rows, seat_columns, low_price_rows, low_price, high_price,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(show.id)
        .bind(&show.provider_id)
        .bind(&show.title)
        .bind(show.release_date)
        .bind(show.rating)
        .bind(&show.poster_url)
        .bind(to_i32(show.seating.rows)?)
        .bind(to_i32(show.seating.columns)?)
        .bind(to_i32(show.seating.low_price_rows)?)
        .bind(show.seating.low_price)
        .bind(show.seating.high_price)
        .bind(show.created_at)
        .bind(show.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_show(&self, show: &Show) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE shows
            SET title = $2, release_date = $3, rating = $4, poster_url = $5,
                seat_rows = $6, seat_columns = $7, low_price_rows = $8,
                low_price = $9, high_price = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(show.id)
        .bind(&show.title)
        .bind(show.release_date)
        .bind(show.rating)
        .bind(&show.poster_url)
        .bind(to_i32(show.seating.rows)?)
        .bind(to_i32(show.seating.columns)?)
        .bind(to_i32(show.seating.low_price_rows)?)
        .bind(show.seating.low_price)
        .bind(show.seating.high_price)
        .bind(show.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_show(&self, id: ShowId) -> Result<(), StorageError> {
        // showtimes и seat_holds удаляются каскадом
        sqlx::query("DELETE FROM shows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_showtime(&self, showtime: &Showtime) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO showtimes (id, show_id, location, show_date, show_time,
                                   seat_rows, seat_columns, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(showtime.id)
        .bind(showtime.show_id)
        .bind(&showtime.location)
        .bind(showtime.date)
        .bind(showtime.time)
        .bind(to_i32(showtime.rows)?)
        .bind(to_i32(showtime.columns)?)
        .bind(showtime.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_catalog(&self) -> Result<(Vec<Show>, Vec<Showtime>), StorageError> {
        let shows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT id, provider_id, title, release_date, rating, poster_url,
                   seat_rows, seat_columns, low_price_rows, low_price, high_price,
                   created_at, updated_at
            FROM shows
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Show::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let showtimes = sqlx::query_as::<_, ShowtimeRow>(
            r#"
            SELECT id, show_id, location, show_date, show_time, seat_rows, seat_columns, created_at
            FROM showtimes
            ORDER BY show_date, show_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Showtime::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        info!("Loaded {} shows and {} showtimes", shows.len(), showtimes.len());
        Ok((shows, showtimes))
    }

    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO seat_holds (id, show_id, showtime_id, holder_id, seats,
                                    ticket_cost, platform_fee, tax, total, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(hold.id)
        .bind(hold.show_id)
        .bind(hold.showtime_id)
        .bind(&hold.holder_id)
        .bind(Json(&hold.seats))
        .bind(hold.quote.ticket_cost)
        .bind(hold.quote.platform_fee)
        .bind(hold.quote.tax)
        .bind(hold.quote.total)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_holds(&self, ids: &[HoldId]) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query("DELETE FROM seat_holds WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn promote_hold(&self, hold_id: HoldId, booking: &Booking) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM seat_holds WHERE id = $1")
            .bind(hold_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, show_id, showtime_id, seats,
                                  ticket_cost, platform_fee, tax, total,
                                  payment_ref, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(booking.show_id)
        .bind(booking.showtime_id)
        .bind(Json(&booking.seats))
        .bind(booking.price.ticket_cost)
        .bind(booking.price.platform_fee)
        .bind(booking.price.tax)
        .bind(booking.price.total)
        .bind(&booking.payment_ref)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::DuplicatePaymentRef(booking.payment_ref.clone())
            }
            other => StorageError::Database(other),
        })?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_active_holds(&self, now: DateTime<Utc>) -> Result<Vec<SeatHold>, StorageError> {
        let purged = sqlx::query("DELETE FROM seat_holds WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            info!("🧹 Purged {} expired seat holds on startup", purged);
        }

        let holds = sqlx::query_as::<_, HoldRow>(
            r#"
            SELECT id, show_id, showtime_id, holder_id, seats,
                   ticket_cost, platform_fee, tax, total, created_at, expires_at
            FROM seat_holds
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(holds.into_iter().map(SeatHold::from).collect())
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let affected = sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(StorageError::Corrupt(format!("booking {id} missing")));
        }
        Ok(())
    }

    async fn load_bookings(&self) -> Result<Vec<Booking>, StorageError> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, user_id, show_id, showtime_id, seats,
                   ticket_cost, platform_fee, tax, total,
                   payment_ref, status, created_at, updated_at
            FROM bookings
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
    }
}
