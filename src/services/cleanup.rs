use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::inventory::SeatInventory;

/// Фоновая очистка просроченных холдов.
///
/// Доступ к сеансам и так снимает истёкшие холды лениво, но без фоновой
/// очистки строки холдов копились бы в БД для сеансов, к которым никто не обращается.
pub struct HoldSweeper {
    inventory: Arc<SeatInventory>,
    interval: Duration,
}

impl HoldSweeper {
    pub fn new(inventory: Arc<SeatInventory>, interval: Duration) -> Self {
        Self { inventory, interval }
    }

    /// Один проход очистки. Возвращает число снятых холдов.
    pub async fn run_once(&self) -> usize {
        let released = self.inventory.expire_holds().await;
        if released.is_empty() {
            debug!("🧹 No expired holds to sweep");
        }
        released.len()
    }

    /// Запускает очистку по таймеру до сигнала остановки.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🧹 Hold sweeper started, interval {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("✅ Hold sweeper stopped");
        })
    }
}
