use crate::api::AppState;
use crate::domain::credential::{OpaqueToken, Scope};
use crate::error::AppError;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

fn bearer_token(parts: &Parts) -> Option<&str> {
    let auth_str = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

/// Request guard for ordinary protected endpoints: resolves the bearer token
/// to an unexpired access-scoped credential. All failures collapse to 401.
#[derive(Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::AuthError)?;

        let credential = state
            .credentials
            .find_by_hash(&OpaqueToken::hash(token))
            .await?
            .ok_or(AppError::AuthError)?;

        if !credential.has_scope(Scope::Access) || credential.is_expired() {
            return Err(AppError::AuthError);
        }

        Ok(Self { user_id: credential.user_id })
    }
}

/// Request guard for the refresh endpoint. Unlike [`AuthUser`], the checks
/// are ordered and each failure is distinct:
///
/// 1. missing bearer token        -> 401 `MissingToken`
/// 2. unresolvable token          -> 401 `InvalidToken`
/// 3. capability lacks `refresh`  -> 403 `InsufficientScope`
/// 4. recorded expiry in the past -> 401 `ExpiredToken`
///
/// Scope is checked before expiry: an expired access-scoped token must fail
/// with the scope error, not the expiry error.
#[derive(Debug)]
pub struct RefreshPrincipal {
    pub user_id: Uuid,
    pub token_hash: String,
}

impl FromRequestParts<AppState> for RefreshPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::MissingToken)?;

        let token_hash = OpaqueToken::hash(token);
        let credential = state.credentials.find_by_hash(&token_hash).await?.ok_or(AppError::InvalidToken)?;

        if !credential.has_scope(Scope::Refresh) {
            return Err(AppError::InsufficientScope);
        }

        if credential.is_expired() {
            return Err(AppError::ExpiredToken);
        }

        Ok(Self { user_id: credential.user_id, token_hash })
    }
}
