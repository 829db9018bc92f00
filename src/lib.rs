pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod redis_client;
pub mod repository;
pub mod services;

use axum::{routing::get, Router};
use chrono::Duration;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::cache::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
use crate::catalog::CatalogStore;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use crate::inventory::SeatInventory;
use crate::ledger::BookingLedger;
use crate::middleware::IdentityVerifier;
use crate::pricing::PricingPolicy;
use crate::repository::{MemoryRepository, PgRepository, Repository};
use crate::services::{BookingService, PaymentGateway, PaymentGatewayClient};

// Shared state для всего приложения
pub struct AppState {
    pub config: Config,
    pub booking: Arc<BookingService>,
    pub inventory: Arc<SeatInventory>,
    pub verifier: Arc<IdentityVerifier>,
}

impl AppState {
    /// Поднимает инфраструктуру по конфигурации и восстанавливает состояние из хранилища.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let repo: Arc<dyn Repository> = match config.storage.backend {
            StorageBackend::Postgres => {
                let url = config
                    .storage
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres storage"))?;
                let db = database::Database::new(url, config.storage.pool_size).await?;
                db.run_migrations().await?;
                Arc::new(PgRepository::new(&db))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage, state is lost on restart");
                Arc::new(MemoryRepository::new())
            }
        };

        let revocations: Arc<dyn RevocationStore> = match &config.redis.url {
            Some(url) => Arc::new(RedisRevocationStore::new(redis_client::RedisClient::new(url).await?)),
            None => {
                info!("REDIS_URL not set, token revocations are kept in memory");
                Arc::new(MemoryRevocationStore::new())
            }
        };

        let payments: Arc<dyn PaymentGateway> =
            Arc::new(PaymentGatewayClient::from_config(&config.payment, &config.circuit_breaker)?);

        Ok(Self::from_parts(config, repo, revocations, payments, Arc::new(SystemClock)).await?)
    }

    /// Собирает состояние из готовых зависимостей; используется и в тестах.
    pub async fn from_parts(
        config: Config,
        repo: Arc<dyn Repository>,
        revocations: Arc<dyn RevocationStore>,
        payments: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, AppError> {
        let pricing = PricingPolicy {
            platform_fee: config.booking.platform_fee,
            tax_percent: config.booking.tax_percent,
        };

        let catalog = Arc::new(CatalogStore::new(repo.clone(), clock.clone()));
        let inventory = Arc::new(SeatInventory::new(
            catalog.clone(),
            repo.clone(),
            clock.clone(),
            pricing,
            config.booking.max_seats_per_hold,
        ));
        let ledger = Arc::new(BookingLedger::new(inventory.clone(), repo.clone(), clock.clone()));

        catalog.hydrate().await?;
        let holds = repo.load_active_holds(clock.now()).await?;
        let bookings = repo.load_bookings().await?;
        inventory.hydrate(holds, &bookings).await?;
        ledger.hydrate(bookings).await;

        let booking = Arc::new(BookingService::new(
            catalog,
            inventory.clone(),
            ledger,
            payments,
            Duration::seconds(config.booking.hold_ttl_seconds),
        ));
        let verifier = Arc::new(IdentityVerifier::new(&config.jwt.secret, &config.jwt.admin_role, revocations));

        Ok(Arc::new(Self {
            config,
            booking,
            inventory,
            verifier,
        }))
    }
}

/// Главный роутер приложения.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Seat Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
