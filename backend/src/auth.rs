//! Ownership checks for route-owning entities.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authorization required: send `Authorization: Bearer <token>`")]
    MissingCredential,
    #[error("unknown or revoked credential")]
    InvalidCredential,
    #[error("caller does not own {0}")]
    Forbidden(String),
    #[error("authorization store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Resolve a credential to a user and confirm that user owns `owner_id`.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, credential: &str, owner_id: &str) -> Result<String, AuthError>;
}

/// Extract the bearer token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredential)
}

/// Reads `api_tokens` and `route_owners`, both owned by the account service.
#[derive(Clone)]
pub struct PgAuthorizer {
    pool: PgPool,
}

impl PgAuthorizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authorizer for PgAuthorizer {
    async fn authorize(&self, credential: &str, owner_id: &str) -> Result<String, AuthError> {
        let user_id: String =
            sqlx::query_scalar("SELECT user_id FROM api_tokens WHERE token = $1 AND revoked_at IS NULL")
                .bind(credential)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(AuthError::InvalidCredential)?;

        let owns: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM route_owners WHERE owner_id = $1 AND user_id = $2)",
        )
        .bind(owner_id)
        .bind(&user_id)
        .fetch_one(&self.pool)
        .await?;

        if owns {
            Ok(user_id)
        } else {
            tracing::info!("user {} denied access to {}", user_id, owner_id);
            Err(AuthError::Forbidden(owner_id.to_string()))
        }
    }
}

/// Fixed token table, for tests and local runs without the account service.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    tokens: HashMap<String, String>,
    ownership: HashMap<String, HashSet<String>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` for `user_id` and give that user ownership of `owner_id`.
    pub fn grant(mut self, token: &str, user_id: &str, owner_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self.ownership
            .entry(user_id.to_string())
            .or_default()
            .insert(owner_id.to_string());
        self
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, credential: &str, owner_id: &str) -> Result<String, AuthError> {
        let user_id = self
            .tokens
            .get(credential)
            .ok_or(AuthError::InvalidCredential)?;
        let owns = self
            .ownership
            .get(user_id)
            .is_some_and(|owned| owned.contains(owner_id));
        if owns {
            Ok(user_id.clone())
        } else {
            Err(AuthError::Forbidden(owner_id.to_string()))
        }
    }
}
