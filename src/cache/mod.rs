//! Хранилище отозванных токенов.
//!
//! Ключ `revoked:<token id>` живёт ровно столько, сколько осталось жить самому токену:
//! после `exp` токен и так не пройдёт проверку.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::redis_client::RedisClient;
use crate::repository::StorageError;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Отзывает токен до момента `expires_at`.
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError>;
    async fn is_revoked(&self, token_id: &str) -> Result<bool, StorageError>;
}

fn revoked_key(token_id: &str) -> String {
    format!("revoked:{}", token_id)
}

#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: RedisClient,
}

impl RedisRevocationStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        let ttl = (expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            return Ok(());
        }
        let mut conn = self.redis.conn.clone();
        let _: () = conn.set_ex(revoked_key(token_id), 1, ttl as u64).await?;
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.redis.conn.clone();
        Ok(conn.exists(revoked_key(token_id)).await?)
    }
}

/// Отзывы в памяти процесса, когда Redis не настроен.
#[derive(Default)]
pub struct MemoryRevocationStore {
    revoked: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.revoked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut entries = self.entries();
        entries.retain(|_, until| *until > now);
        if expires_at > now {
            entries.insert(revoked_key(token_id), expires_at);
        }
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self
            .entries()
            .get(&revoked_key(token_id))
            .is_some_and(|until| *until > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn memory_store_tracks_revocations_until_expiry() {
        let store = MemoryRevocationStore::new();
        let later = Utc::now() + Duration::minutes(10);

        assert!(!store.is_revoked("jti-1").await.unwrap());
        store.revoke("jti-1", later).await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());
        assert!(!store.is_revoked("jti-2").await.unwrap());

        // уже истёкший токен не запоминаем
        store.revoke("jti-3", Utc::now() - Duration::seconds(1)).await.unwrap();
        assert!(!store.is_revoked("jti-3").await.unwrap());
    }
}
