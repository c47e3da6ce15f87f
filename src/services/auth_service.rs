use crate::config::AuthConfig;
use crate::domain::credential::{Credential, OpaqueToken, Scope};
use crate::domain::session::IssuedSession;
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::storage::{CredentialStore, UserStore};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use opentelemetry::{global, metrics::Counter};
use rand::rngs::OsRng;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone)]
struct Metrics {
    login_total: Counter<u64>,
    refresh_total: Counter<u64>,
    logout_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("keygate");
        Self {
            login_total: meter
                .u64_counter("auth_login_total")
                .with_description("Total number of successful login attempts")
                .build(),
            refresh_total: meter
                .u64_counter("auth_refresh_total")
                .with_description("Total number of successful token rotations")
                .build(),
            logout_total: meter
                .u64_counter("auth_logout_total")
                .with_description("Total number of successful logout attempts")
                .build(),
        }
    }
}

/// Single authority for credential issuance, rotation, and revocation.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialStore>,
    metrics: Metrics,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").field("config", &self.config).finish_non_exhaustive()
    }
}

impl AuthService {
    #[must_use]
    pub fn new(config: AuthConfig, users: Arc<dyn UserStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { config, users, credentials, metrics: Metrics::new() }
    }

    #[tracing::instrument(skip(self, password), err(level = "warn"))]
    pub async fn register(&self, name: String, email: String, password: String) -> Result<IssuedSession> {
        if password.len() < 8 {
            return Err(AppError::BadRequest("Password must be at least 8 characters".to_string()));
        }

        let password_hash = self.hash_password(&password).await?;
        let user = self.users.create(&name, &email, &password_hash).await?;

        tracing::info!(user_id = %user.id, "User registered");
        self.issue_session(user).await
    }

    #[tracing::instrument(
        skip(self, email, password),
        fields(user_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub async fn login(&self, email: String, password: String) -> Result<IssuedSession> {
        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                tracing::warn!("Login failed: user not found");
                return Err(AppError::AuthError);
            }
        };

        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        let is_valid = self.verify_password(&password, &user.password_hash).await?;

        if !is_valid {
            tracing::warn!("Login failed: invalid password");
            return Err(AppError::AuthError);
        }

        let session = self.issue_session(user).await?;
        self.metrics.login_total.add(1, &[]);
        Ok(session)
    }

    /// Rotates a refresh credential: consumes the presented one and issues a
    /// fresh (access, refresh) pair. The presented hash must already have
    /// passed refresh validation; a consume that finds nothing means a
    /// concurrent rotation won the race.
    #[tracing::instrument(skip(self, presented_hash), fields(user_id = %user_id), err(level = "warn"))]
    pub async fn refresh_session(&self, user_id: Uuid, presented_hash: &str) -> Result<IssuedSession> {
        let consumed = self.credentials.delete_by_hash(presented_hash).await?;
        if consumed == 0 {
            return Err(AppError::InvalidToken);
        }

        let user = self.users.find_by_id(user_id).await?.ok_or(AppError::AuthError)?;
        let session = self.issue_session(user).await?;

        tracing::info!("Tokens rotated successfully");
        self.metrics.refresh_total.add(1, &[]);
        Ok(session)
    }

    /// Revokes every credential the principal owns.
    #[tracing::instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        let revoked = self.credentials.delete_for_user(user_id).await?;
        tracing::info!(revoked, "Session revoked");
        self.metrics.logout_total.add(1, &[]);
        Ok(())
    }

    pub async fn user_profile(&self, user_id: Uuid) -> Result<User> {
        self.users.find_by_id(user_id).await?.ok_or(AppError::NotFound)
    }

    /// Generates and persists an (access, refresh) pair for the user.
    /// The access credential carries exactly `{access}` and the refresh
    /// credential exactly `{refresh}`; neither set ever overlaps.
    async fn issue_session(&self, user: User) -> Result<IssuedSession> {
        let now = OffsetDateTime::now_utc();
        let access_expires_at = now + Duration::minutes(self.config.access_token_ttl_mins);
        let refresh_expires_at = now + Duration::minutes(self.config.refresh_token_ttl_mins);

        let access_token = OpaqueToken::generate();
        let refresh_token = OpaqueToken::generate();

        self.credentials
            .insert(&Credential {
                token_hash: OpaqueToken::hash(&access_token),
                user_id: user.id,
                scopes: vec![Scope::Access],
                expires_at: Some(access_expires_at),
                created_at: now,
            })
            .await?;

        self.credentials
            .insert(&Credential {
                token_hash: OpaqueToken::hash(&refresh_token),
                user_id: user.id,
                scopes: vec![Scope::Refresh],
                expires_at: Some(refresh_expires_at),
                created_at: now,
            })
            .await?;

        Ok(IssuedSession { user, access_token, refresh_token, access_expires_at, refresh_expires_at })
    }

    #[tracing::instrument(err, skip(self, password))]
    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let argon2 = Argon2::default();
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map_err(|_| AppError::Internal)
                .map(|h| h.to_string())
        })
        .await
        .map_err(|_| AppError::Internal)?
    }

    #[tracing::instrument(err, skip(self, password, password_hash))]
    pub async fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash).map_err(|_| AppError::Internal)?;
            Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
        })
        .await
        .map_err(|_| AppError::Internal)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryCredentialStore, MemoryUserStore};

    fn setup_service() -> AuthService {
        let config = AuthConfig {
            access_token_ttl_mins: 60,
            refresh_token_ttl_mins: 10_080,
            credential_sweep_interval_secs: 0,
        };
        AuthService::new(config, Arc::new(MemoryUserStore::new()), Arc::new(MemoryCredentialStore::new()))
    }

    #[tokio::test]
    async fn test_password_hashing() {
        let service = setup_service();
        let password = "password12345";
        let hash = service.hash_password(password).await.unwrap();

        assert!(service.verify_password(password, &hash).await.unwrap());
        assert!(!service.verify_password("wrong_password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_issued_pair_has_disjoint_scopes() {
        let service = setup_service();
        let session = service
            .register("Ada".to_string(), "ada@example.com".to_string(), "password12345".to_string())
            .await
            .unwrap();

        let access = service
            .credentials
            .find_by_hash(&OpaqueToken::hash(&session.access_token))
            .await
            .unwrap()
            .expect("access credential stored");
        let refresh = service
            .credentials
            .find_by_hash(&OpaqueToken::hash(&session.refresh_token))
            .await
            .unwrap()
            .expect("refresh credential stored");

        assert_eq!(access.scopes, vec![Scope::Access]);
        assert_eq!(refresh.scopes, vec![Scope::Refresh]);
    }

    #[tokio::test]
    async fn test_refresh_consumes_old_token() {
        let service = setup_service();
        let session = service
            .register("Ada".to_string(), "ada@example.com".to_string(), "password12345".to_string())
            .await
            .unwrap();

        let old_hash = OpaqueToken::hash(&session.refresh_token);
        let rotated = service.refresh_session(session.user.id, &old_hash).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);

        // Second rotation with the consumed hash loses the race.
        let err = service.refresh_session(session.user.id, &old_hash).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let service = setup_service();
        let err = service
            .register("Ada".to_string(), "ada@example.com".to_string(), "short".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
