//! Каталог шоу и сеансов.
//!
//! Шоу принадлежит провайдеру, создавшему его: менять, удалять и добавлять
//! сеансы может только он. Сетка сеанса копирует размеры зала в момент создания.

use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{NewShow, Show, ShowId, ShowUpdate, Showtime, ShowtimeId, UserId};
use crate::repository::Repository;

#[derive(Default)]
struct CatalogState {
    shows: HashMap<ShowId, Show>,
    showtimes: HashMap<ShowtimeId, Showtime>,
}

impl CatalogState {
    fn owned_show(&self, id: ShowId, provider: &UserId) -> Result<&Show, AppError> {
        let show = self.shows.get(&id).ok_or_else(|| AppError::not_found("show", id))?;
        if !show.is_owned_by(provider) {
            return Err(AppError::Unauthorized(format!("show {id} belongs to another provider")));
        }
        Ok(show)
    }

    fn showtimes_of(&self, show_id: ShowId) -> Vec<Showtime> {
        let mut list: Vec<Showtime> = self
            .showtimes
            .values()
            .filter(|st| st.show_id == show_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| (a.date, a.time, &a.location).cmp(&(b.date, b.time, &b.location)));
        list
    }
}

pub struct CatalogStore {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    state: RwLock<CatalogState>,
}

impl CatalogStore {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Загружает каталог из репозитория (при старте).
    pub async fn hydrate(&self) -> Result<(), AppError> {
        let (shows, showtimes) = self.repo.load_catalog().await?;
        let mut state = self.state.write().await;
        state.shows = shows.into_iter().map(|s| (s.id, s)).collect();
        state.showtimes = showtimes.into_iter().map(|st| (st.id, st)).collect();
        info!("Catalog hydrated: {} shows, {} showtimes", state.shows.len(), state.showtimes.len());
        Ok(())
    }

    pub async fn create_show(&self, provider: &UserId, draft: NewShow) -> Result<Show, AppError> {
        draft.validate()?;

        let now = self.clock.now();
        let show = Show {
            id: ShowId::new(),
            provider_id: provider.clone(),
            title: draft.title.trim().to_string(),
            release_date: draft.release_date,
            rating: draft.rating,
            poster_url: draft.poster_url,
            seating: draft.seating,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        self.repo.insert_show(&show).await?;
        state.shows.insert(show.id, show.clone());

        info!("Show {} '{}' created by provider {}", show.id, show.title, provider);
        Ok(show)
    }

    pub async fn update_show(
        &self,
        id: ShowId,
        provider: &UserId,
        patch: ShowUpdate,
    ) -> Result<Show, AppError> {
        let mut state = self.state.write().await;
        let current = state.owned_show(id, provider)?;

        let mut updated = patch.apply_to(current)?;
        let resized = updated.seating.rows != current.seating.rows
            || updated.seating.columns != current.seating.columns;
        if resized && state.showtimes.values().any(|st| st.show_id == id) {
            return Err(AppError::InvalidSpec(
                "seat grid cannot be resized once showtimes exist".to_string(),
            ));
        }
        updated.updated_at = self.clock.now();

        self.repo.update_show(&updated).await?;
        state.shows.insert(id, updated.clone());
        Ok(updated)
    }

    /// Удаляет шоу и его сеансы. Возвращает идентификаторы удалённых сеансов.
    ///
    /// Проверка активных холдов и бронирований - задача вызывающего (см. `BookingService::delete_show`).
    pub async fn delete_show(&self, id: ShowId, provider: &UserId) -> Result<Vec<ShowtimeId>, AppError> {
        let mut state = self.state.write().await;
        state.owned_show(id, provider)?;

        self.repo.delete_show(id).await?;

        state.shows.remove(&id);
        let removed: Vec<ShowtimeId> = state.showtimes_of(id).into_iter().map(|st| st.id).collect();
        for showtime_id in &removed {
            state.showtimes.remove(showtime_id);
        }

        info!("Show {} deleted with {} showtimes", id, removed.len());
        Ok(removed)
    }

    /// Добавляет сеанс с пустой сеткой по конфигурации зала шоу.
    pub async fn add_showtime(
        &self,
        show_id: ShowId,
        provider: &UserId,
        location: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Showtime, AppError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(AppError::InvalidSpec("location must not be empty".to_string()));
        }

        let mut state = self.state.write().await;
        let show = state.owned_show(show_id, provider)?;
        let seating = show.seating;

        if state
            .showtimes
            .values()
            .any(|st| st.show_id == show_id && st.same_slot(location, date, time))
        {
            return Err(AppError::InvalidSpec(format!(
                "showtime {location} {date} {time} already exists"
            )));
        }

        let showtime = Showtime {
            id: ShowtimeId::new(),
            show_id,
            location: location.to_string(),
            date,
            time,
            rows: seating.rows,
            columns: seating.columns,
            created_at: self.clock.now(),
        };

        self.repo.insert_showtime(&showtime).await?;
        state.showtimes.insert(showtime.id, showtime.clone());

        info!(
            "Showtime {} added to show {}: {} {} {} ({}x{})",
            showtime.id, show_id, location, date, time, showtime.rows, showtime.columns
        );
        Ok(showtime)
    }

    pub async fn get_showtime(&self, id: ShowtimeId) -> Result<Showtime, AppError> {
        self.state
            .read()
            .await
            .showtimes
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("showtime", id))
    }

    pub async fn get_show(&self, id: ShowId) -> Result<Show, AppError> {
        self.state
            .read()
            .await
            .shows
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("show", id))
    }

    pub async fn list_shows(&self) -> Vec<Show> {
        let mut shows: Vec<Show> = self.state.read().await.shows.values().cloned().collect();
        shows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.title.cmp(&b.title)));
        shows
    }

    pub async fn showtimes_of(&self, show_id: ShowId) -> Vec<Showtime> {
        self.state.read().await.showtimes_of(show_id)
    }
}
