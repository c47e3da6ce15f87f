//! Client-side token lifecycle: durable token storage, an auth manager with
//! proactive and 401-triggered refresh behind a single-flight lock, and a
//! reactive session projection for UI layers.

pub mod clock;
pub mod error;
pub mod manager;
pub mod session;
pub mod token_store;

pub use clock::{Clock, SystemClock};
pub use error::ClientError;
pub use manager::{AuthManager, ClientConfig, RequestBody, RequestOptions};
pub use session::{SessionBinding, SessionState};
pub use token_store::{FileBackend, MemoryBackend, StorageBackend, TokenStore};
