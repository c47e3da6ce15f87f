use crate::domain::user::User;
use time::OffsetDateTime;

/// A freshly issued (access, refresh) pair, with plaintext tokens.
/// Exists only long enough to be serialized into the issuance response.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_expires_at: OffsetDateTime,
}
