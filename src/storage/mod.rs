use crate::domain::credential::Credential;
use crate::domain::user::User;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub mod credential_repo;
pub mod memory;
pub mod user_repo;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(database_url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(20).connect(database_url).await
}

/// Persistence seam for issued credentials. Stores hold token hashes only.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, credential: &Credential) -> Result<()>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Credential>>;

    /// Removes a single credential, returning how many rows were deleted.
    /// A return of 0 means someone else consumed it first.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64>;

    /// Revokes every credential owned by the given principal.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Sweeps credentials whose recorded expiry is in the past.
    async fn delete_expired(&self) -> Result<u64>;

    /// Connectivity check for the readiness probe.
    async fn check(&self) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync + std::fmt::Debug {
    /// Creates a user; fails with `AppError::Conflict` if the email is taken.
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> Result<User>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Connectivity check for the readiness probe.
    async fn check(&self) -> Result<()>;
}
