//! payment.rs
//!
//! Клиент внешнего платёжного шлюза.
//!
//! 1.  **PaymentGateway**: узкий интерфейс, которым пользуется бронирование:
//!     "подтверди платёж `payment_ref` на сумму `amount`".
//! 2.  **CircuitBreaker**: автоматический выключатель, чтобы не долбить
//!     неработающий шлюз запросами на каждое подтверждение брони.
//! 3.  **PaymentGatewayClient**: HTTP-реализация поверх API шлюза
//!     (`PaymentCheck/check` + `PaymentConfirm/confirm`), запросы подписываются sha256-токеном.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::models::Money;

/// Итог проверки платежа шлюзом.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    Confirmed,
    Declined { reason: String },
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    CircuitOpen,

    #[error("payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment gateway error: {0}")]
    Gateway(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm_payment(&self, payment_ref: &str, amount: Money) -> Result<PaymentVerdict, PaymentError>;
}

/// Состояния "Автоматического выключателя".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Нормальный режим, запросы разрешены.
    Closed,
    /// Запросы блокируются до истечения таймаута.
    Open,
    /// Пропускается пробный запрос.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, Duration::from_secs(config.timeout_seconds))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Можно ли выполнить следующий запрос.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(self.timeout);
                if elapsed >= self.timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        match inner.state {
            CircuitState::Closed if inner.failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    inner.failures, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }
}

// --- Модели данных для API платёжного шлюза ---

#[derive(Debug, Serialize)]
struct PaymentCheckRequest {
    #[serde(rename = "teamSlug")]
    team_slug: String,
    token: String,
    #[serde(rename = "paymentId")]
    payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCheckResponse {
    pub success: bool,
    pub status: Option<String>,
    pub amount: Option<i64>,
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaymentConfirmRequest {
    #[serde(rename = "teamSlug")]
    team_slug: String,
    token: String,
    #[serde(rename = "paymentId")]
    payment_id: String,
    amount: i64,
    currency: String,
    #[serde(rename = "orderId")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentConfirmResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// HTTP-клиент платёжного шлюза.
pub struct PaymentGatewayClient {
    team_slug: String,
    password: String,
    base_url: String,
    currency: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
}

impl PaymentGatewayClient {
    pub fn from_config(
        config: &PaymentConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            team_slug: config.merchant_id.clone(),
            password: config.merchant_password.clone(),
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            http_client,
            circuit_breaker: CircuitBreaker::from_config(breaker),
        })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Пропускает запрос через выключатель. Сбоем считается только транспортная ошибка.
    async fn execute_with_circuit_breaker<F, T>(&self, operation: F) -> Result<T, PaymentError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking payment gateway request");
            return Err(PaymentError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                error!("Payment gateway request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                Err(PaymentError::Transport(e))
            }
        }
    }

    fn sign(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    fn check_token(&self, payment_id: &str) -> String {
        Self::sign(&[payment_id, &self.password, &self.team_slug])
    }

    fn confirm_token(&self, amount: Money, order_id: &str) -> String {
        Self::sign(&[&amount.to_string(), &self.currency, order_id, &self.password, &self.team_slug])
    }

    pub async fn check_payment_status(&self, payment_id: &str) -> Result<PaymentCheckResponse, PaymentError> {
        let request = PaymentCheckRequest {
            team_slug: self.team_slug.clone(),
            token: self.check_token(payment_id),
            payment_id: payment_id.to_string(),
        };

        let operation = async {
            self.http_client
                .post(format!("{}/api/v1/PaymentCheck/check", self.base_url))
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<PaymentCheckResponse>()
                .await
        };

        self.execute_with_circuit_breaker(operation).await
    }

    async fn capture(&self, payment_id: &str, amount: Money, order_id: &str) -> Result<PaymentConfirmResponse, PaymentError> {
        let request = PaymentConfirmRequest {
            team_slug: self.team_slug.clone(),
            token: self.confirm_token(amount, order_id),
            payment_id: payment_id.to_string(),
            amount,
            currency: self.currency.clone(),
            order_id: order_id.to_string(),
        };

        let operation = async {
            self.http_client
                .post(format!("{}/api/v1/PaymentConfirm/confirm", self.base_url))
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<PaymentConfirmResponse>()
                .await
        };

        self.execute_with_circuit_breaker(operation).await
    }
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    /// Проверяет статус платежа и, если он только авторизован, списывает его.
    async fn confirm_payment(&self, payment_ref: &str, amount: Money) -> Result<PaymentVerdict, PaymentError> {
        info!("Confirming payment {} for amount {}", payment_ref, amount);

        let check = self.check_payment_status(payment_ref).await?;
        if !check.success {
            return Ok(PaymentVerdict::Declined {
                reason: check.message.unwrap_or_else(|| "payment not found".to_string()),
            });
        }
        // Без суммы от шлюза подтверждать нечего
        let Some(paid) = check.amount else {
            return Err(PaymentError::Gateway(format!("no amount reported for payment {payment_ref}")));
        };
        if paid != amount {
            return Ok(PaymentVerdict::Declined {
                reason: format!("payment amount {paid} does not match quoted total {amount}"),
            });
        }

        let status = check.status.unwrap_or_default();
        match status.as_str() {
            "CONFIRMED" => Ok(PaymentVerdict::Confirmed),
            "AUTHORIZED" => {
                let order_id = check.order_id.unwrap_or_else(|| payment_ref.to_string());
                let captured = self.capture(payment_ref, amount, &order_id).await?;
                if captured.success {
                    Ok(PaymentVerdict::Confirmed)
                } else {
                    Ok(PaymentVerdict::Declined {
                        reason: captured.message.unwrap_or_else(|| "capture rejected".to_string()),
                    })
                }
            }
            "" => Err(PaymentError::Gateway(format!("no status for payment {payment_ref}"))),
            other => Ok(PaymentVerdict::Declined {
                reason: format!("payment is {other}"),
            }),
        }
    }
}
