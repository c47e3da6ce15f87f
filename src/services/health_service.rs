use crate::error::Result;
use crate::storage::{CredentialStore, UserStore};
use std::sync::Arc;

/// Readiness checks over the persistence seams.
#[derive(Debug, Clone)]
pub struct HealthService {
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialStore>,
}

impl HealthService {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { users, credentials }
    }

    pub async fn check_users(&self) -> Result<()> {
        self.users.check().await
    }

    pub async fn check_credentials(&self) -> Result<()> {
        self.credentials.check().await
    }
}
