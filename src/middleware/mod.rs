use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::RevocationStore;
use crate::error::AppError;
use crate::models::UserId;
use crate::AppState;

/// Поля токена. Выпускает токены внешний identity-провайдер, мы только проверяем подпись.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Аутентифицированный пользователь запроса.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub is_admin: bool,
    /// `jti` или sha256 самого токена
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

pub struct IdentityVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    admin_role: String,
    revocations: Arc<dyn RevocationStore>,
}

impl IdentityVerifier {
    pub fn new(secret: &str, admin_role: &str, revocations: Arc<dyn RevocationStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            admin_role: admin_role.to_string(),
            revocations,
        }
    }

    /// Проверяет подпись, срок и отзыв токена.
    pub async fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            AppError::Unauthenticated
        })?;
        let claims = data.claims;

        if claims.sub.trim().is_empty() {
            return Err(AppError::Unauthenticated);
        }
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(AppError::Unauthenticated)?;
        let token_id = claims.jti.clone().unwrap_or_else(|| fingerprint(token));

        if self.revocations.is_revoked(&token_id).await? {
            debug!("Revoked token presented for {}", claims.sub);
            return Err(AppError::Unauthenticated);
        }

        let is_admin = claims.role.as_deref() == Some(self.admin_role.as_str());
        Ok(AuthUser {
            user_id: UserId::new(claims.sub),
            is_admin,
            token_id,
            expires_at,
        })
    }

    pub async fn revoke(&self, user: &AuthUser) -> Result<(), AppError> {
        self.revocations.revoke(&user.token_id, user.expires_at).await?;
        Ok(())
    }

    /// Подписывает токен тем же секретом. Нужен для локальной разработки и тестов.
    pub fn issue(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            warn!("Failed to sign token: {}", e);
            AppError::Unauthenticated
        })
    }
}

fn fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

// Bearer auth extractor
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthenticated)?;

        state.verifier.verify(token).await
    }
}
