use crate::domain::credential::{Credential, Scope};
use crate::error::{AppError, Result};
use crate::storage::{CredentialStore, DbPool};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Postgres-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: DbPool,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    token_hash: String,
    user_id: Uuid,
    scopes: Vec<String>,
    expires_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl CredentialRow {
    fn into_domain(self) -> Result<Credential> {
        let scopes = self
            .scopes
            .iter()
            .map(|s| Scope::parse(s).ok_or(AppError::Internal))
            .collect::<Result<Vec<_>>>()?;

        Ok(Credential {
            token_hash: self.token_hash,
            user_id: self.user_id,
            scopes,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn insert(&self, credential: &Credential) -> Result<()> {
        let scopes: Vec<String> = credential.scopes.iter().map(|s| s.as_str().to_string()).collect();

        sqlx::query(
            r"
            INSERT INTO credentials (token_hash, user_id, scopes, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&credential.token_hash)
        .bind(credential.user_id)
        .bind(&scopes)
        .bind(credential.expires_at)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r"
            SELECT token_hash, user_id, scopes, expires_at, created_at
            FROM credentials
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.map(CredentialRow::into_domain).transpose()
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM credentials WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM credentials WHERE expires_at IS NOT NULL AND expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    async fn check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }
}
