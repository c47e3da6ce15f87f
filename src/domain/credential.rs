use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Capability attached to a stored credential. An access credential never
/// carries `Refresh`, and a refresh credential carries exactly `Refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Access,
    Refresh,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(Self::Access),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }
}

/// A stored credential record. Only the SHA-256 hash of the opaque token is
/// ever persisted; the plaintext exists solely in the issuance response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token_hash: String,
    pub user_id: Uuid,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl Credential {
    #[must_use]
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// A credential with no recorded expiry never expires.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < OffsetDateTime::now_utc())
    }
}

#[derive(Debug)]
pub struct OpaqueToken;

impl OpaqueToken {
    /// Generates a cryptographically secure random string (32 bytes -> Base64).
    #[must_use]
    pub fn generate() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hashes a token using SHA-256 for secure storage.
    #[must_use]
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn credential(scopes: Vec<Scope>, expires_at: Option<OffsetDateTime>) -> Credential {
        Credential {
            token_hash: OpaqueToken::hash("token"),
            user_id: Uuid::new_v4(),
            scopes,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_opaque_token_generation() {
        let token1 = OpaqueToken::generate();
        let token2 = OpaqueToken::generate();

        assert_ne!(token1, token2);
        assert_eq!(token1.len(), 43); // 32 bytes Base64 no pad
    }

    #[test]
    fn test_opaque_token_hashing() {
        let token = "my_token";
        let hash1 = OpaqueToken::hash(token);
        let hash2 = OpaqueToken::hash(token);

        assert_eq!(hash1, hash2);
        assert_ne!(token, hash1);
    }

    #[test]
    fn test_scope_separation() {
        let access = credential(vec![Scope::Access], None);
        let refresh = credential(vec![Scope::Refresh], None);

        assert!(access.has_scope(Scope::Access));
        assert!(!access.has_scope(Scope::Refresh));
        assert!(refresh.has_scope(Scope::Refresh));
        assert!(!refresh.has_scope(Scope::Access));
    }

    #[test]
    fn test_expiry() {
        let live = credential(vec![Scope::Access], Some(OffsetDateTime::now_utc() + Duration::hours(1)));
        let dead = credential(vec![Scope::Access], Some(OffsetDateTime::now_utc() - Duration::hours(1)));
        let eternal = credential(vec![Scope::Access], None);

        assert!(!live.is_expired());
        assert!(dead.is_expired());
        assert!(!eternal.is_expired());
    }

    #[test]
    fn test_scope_parse_roundtrip() {
        for scope in [Scope::Access, Scope::Refresh] {
            assert_eq!(Scope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(Scope::parse("admin"), None);
    }
}
