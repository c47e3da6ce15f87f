use crate::domain::credential::Credential;
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::storage::{CredentialStore, UserStore};
use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// In-memory credential store backed by a concurrent map, keyed by token
/// hash. Used by the integration tests and embeddable deployments.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<String, Credential>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, credential: &Credential) -> Result<()> {
        self.credentials.insert(credential.token_hash.clone(), credential.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Credential>> {
        Ok(self.credentials.get(token_hash).map(|entry| entry.value().clone()))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64> {
        Ok(u64::from(self.credentials.remove(token_hash).is_some()))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let before = self.credentials.len();
        self.credentials.retain(|_, credential| credential.user_id != user_id);
        Ok((before - self.credentials.len()) as u64)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.credentials.len();
        self.credentials.retain(|_, credential| credential.expires_at.is_none_or(|at| at >= now));
        Ok((before - self.credentials.len()) as u64)
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory user store with a unique-email index.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, User>,
    by_email: DashMap<String, Uuid>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Some(OffsetDateTime::now_utc()),
        };

        // Entry API keeps the uniqueness check and the index insert atomic.
        use dashmap::mapref::entry::Entry;
        match self.by_email.entry(email.to_string()) {
            Entry::Occupied(_) => return Err(AppError::Conflict("Email already registered".to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.by_email.get(email).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}
