use crate::client::error::ClientError;
use crate::client::token_store::TokenStore;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Proactive refresh threshold: refresh when the access token expires
/// within this window.
pub const DEFAULT_REFRESH_THRESHOLD_MS: i64 = 5 * 60 * 1000;

const DEFAULT_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints that never participate in the 401 refresh-and-retry cycle.
const AUTH_PATHS: [&str; 4] = ["/api/login", "/api/register", "/api/logout", "/api/auth/refresh"];

fn is_auth_path(path: &str) -> bool {
    AUTH_PATHS.contains(&path) || path.starts_with("/api/auth/")
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub refresh_threshold_ms: i64,
    pub expiry_check_interval: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_threshold_ms: DEFAULT_REFRESH_THRESHOLD_MS,
            expiry_check_interval: DEFAULT_EXPIRY_CHECK_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized to JSON with the matching content type.
    Json(Value),
    /// Binary/multipart payload; when `content_type` is `None` the header is
    /// left for the transport to set.
    Raw { content_type: Option<String>, data: Bytes },
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn post_json(body: Value) -> Self {
        Self { method: Method::POST, headers: HeaderMap::new(), body: Some(RequestBody::Json(body)) }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<(), ClientError>>>;

#[derive(Default)]
struct FlightSlot {
    next_id: u64,
    current: Option<(u64, RefreshFuture)>,
}

struct Ticker {
    shutdown: watch::Sender<bool>,
}

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    store: TokenStore,
    refresh_flight: Mutex<FlightSlot>,
    ticker: Mutex<Option<Ticker>>,
}

/// Single authority for login, registration, logout, refresh, and
/// authenticated request dispatch. Cheap to clone; clones share one
/// single-flight refresh lock and one periodic-check timer.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager").field("config", &self.inner.config).finish_non_exhaustive()
    }
}

impl AuthManager {
    /// Builds a manager over the given store.
    ///
    /// # Errors
    /// Returns `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, store: TokenStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                store,
                refresh_flight: Mutex::new(FlightSlot::default()),
                ticker: Mutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.config.base_url, path)
    }

    /// Starts the periodic expiry check. Idempotent; a second call while the
    /// timer is running is a no-op. `stop()` (or logout) cancels it.
    pub fn start(&self) {
        let mut guard = self.ticker_guard();
        if guard.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let manager = self.clone();
        let period = self.inner.config.expiry_check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval is immediate; skip it so
            // checks run every `period`, not at startup.
            interval.tick().await;
            while !*shutdown_rx.borrow() {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = manager.check_token_expiry().await {
                            tracing::warn!(error = %e, "Periodic expiry check failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {}
                }
            }
            tracing::debug!("Expiry check loop shutting down");
        });

        *guard = Some(Ticker { shutdown });
    }

    /// Cancels the periodic expiry check, if running.
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker_guard().take() {
            let _ = ticker.shutdown.send(true);
        }
    }

    fn ticker_guard(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.inner.ticker.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn flight_guard(&self) -> MutexGuard<'_, FlightSlot> {
        self.inner.refresh_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// POSTs credentials; on success stores the issued pair and caches the
    /// user, then returns the raw response body.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value, ClientError> {
        let data = self.auth_request("/api/login", &json!({ "email": email, "password": password })).await?;
        self.store_issuance(&data)?;
        Ok(data)
    }

    /// Same contract as [`login`](Self::login), against the registration
    /// endpoint.
    pub async fn register(&self, user_data: Value) -> Result<Value, ClientError> {
        let data = self.auth_request("/api/register", &user_data).await?;
        self.store_issuance(&data)?;
        Ok(data)
    }

    async fn auth_request(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let response =
            self.inner.http.post(self.url(path)).header(ACCEPT, "application/json").json(body).send().await?;

        let status = response.status();
        let data = parse_body(response).await;
        if !status.is_success() {
            return Err(ClientError::Authentication { status, body: data });
        }
        Ok(data)
    }

    /// Stores a token pair from an issuance response. Falls back to the
    /// legacy single-token shape, reusing the one token as both access and
    /// refresh; that path is a migration shim and is logged as deprecated.
    fn store_issuance(&self, data: &Value) -> Result<(), ClientError> {
        let access = data.get("access_token").and_then(Value::as_str);
        let refresh = data.get("refresh_token").and_then(Value::as_str);

        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                self.inner.store.save_tokens(access, refresh, data.get("expires_in").and_then(Value::as_i64))?;
            }
            _ => {
                let token = data
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::Protocol("issuance response lacks token fields".to_string()))?;
                tracing::warn!("Server returned legacy single-token format (deprecated); reusing it as both access and refresh");
                self.inner.store.save_tokens(token, token, None)?;
            }
        }

        if let Some(user) = data.get("user") {
            self.inner.store.save_user(user.clone())?;
        }
        Ok(())
    }

    /// Refreshes the access token behind a single-flight lock: at most one
    /// refresh HTTP call is in flight per manager at any time, and every
    /// concurrent caller observes the outcome of that one call.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let flight = {
            let mut slot = self.flight_guard();
            if let Some((_, flight)) = &slot.current {
                flight.clone()
            } else {
                let id = slot.next_id;
                slot.next_id += 1;
                let manager = self.clone();
                // The flight empties its own slot entry before it settles, so
                // a settled outcome is never replayed to a later caller, even
                // when every waiter was dropped mid-flight.
                let flight: RefreshFuture = async move {
                    let result = manager.perform_refresh().await;
                    let mut slot = manager.flight_guard();
                    if slot.current.as_ref().is_some_and(|(current_id, _)| *current_id == id) {
                        slot.current = None;
                    }
                    drop(slot);
                    result
                }
                .boxed()
                .shared();
                slot.current = Some((id, flight.clone()));
                flight
            }
        };

        flight.await
    }

    async fn perform_refresh(&self) -> Result<(), ClientError> {
        let refresh_token = match self.inner.store.refresh_token()? {
            Some(token) => token,
            None => {
                self.force_logout_local()?;
                return Err(ClientError::NoRefreshToken);
            }
        };

        match self.try_refresh(&refresh_token).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; forcing logout");
                let _ = self.logout().await;
                Err(e)
            }
        }
    }

    async fn try_refresh(&self, refresh_token: &str) -> Result<(), ClientError> {
        let response = self
            .inner
            .http
            .post(self.url("/api/auth/refresh"))
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {refresh_token}"))
            .send()
            .await?;

        let status = response.status();
        let body = parse_body(response).await;
        if !status.is_success() {
            return Err(ClientError::Authentication { status, body });
        }

        let access = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Protocol("refresh response lacks access_token".to_string()))?;

        // Rotation is optional server-side; keep the old refresh token when
        // none is returned.
        let new_refresh = body.get("refresh_token").and_then(Value::as_str).unwrap_or(refresh_token);

        self.inner.store.save_tokens(access, new_refresh, body.get("expires_in").and_then(Value::as_i64))?;
        Ok(())
    }

    /// Best-effort server-side revocation, then unconditional local teardown.
    /// Logging out locally always succeeds even when the network leg fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Ok(Some(access_token)) = self.inner.store.access_token() {
            let result = self
                .inner
                .http
                .post(self.url("/api/logout"))
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, format!("Bearer {access_token}"))
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!(error = %e, "Server-side logout failed; clearing local session anyway");
            }
        }

        self.force_logout_local()
    }

    /// Clears the store and cancels the periodic check. No network traffic.
    fn force_logout_local(&self) -> Result<(), ClientError> {
        self.inner.store.clear()?;
        self.stop();
        Ok(())
    }

    /// One periodic-check step. Inside the refresh threshold it refreshes
    /// (subject to the single-flight lock); past full expiry it tears the
    /// session down locally without touching the network.
    pub async fn check_token_expiry(&self) -> Result<(), ClientError> {
        let Some(expiry) = self.inner.store.expiry(self.inner.config.refresh_threshold_ms)? else {
            return Ok(());
        };

        if expiry.is_expired {
            tracing::info!("Access token fully expired; clearing session");
            self.force_logout_local()?;
        } else if expiry.will_expire_soon {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Authenticated request dispatch: proactively refreshes a
    /// soon-to-expire token, attaches the bearer header, and on a 401 from a
    /// non-auth endpoint runs exactly one refresh-then-retry cycle.
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Value, ClientError> {
        self.check_token_expiry().await?;

        let access_token = self.inner.store.access_token()?;
        let response = self.send(path, &options, access_token.as_deref()).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED && access_token.is_some() && !is_auth_path(path) {
            // refresh() forces logout on failure, so the error propagates as
            // a terminal authentication failure with no retry.
            self.refresh().await?;
            let new_token = self.inner.store.access_token()?;
            let retry = self.send(path, &options, new_token.as_deref()).await?;
            return handle_response(retry).await;
        }

        handle_response(response).await
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request =
            self.inner.http.request(options.method.clone(), self.url(path)).header(ACCEPT, "application/json");

        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        if let Some(token) = access_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        match &options.body {
            Some(RequestBody::Json(value)) => request = request.json(value),
            Some(RequestBody::Raw { content_type, data }) => {
                if let Some(content_type) = content_type {
                    request = request.header(CONTENT_TYPE, content_type);
                }
                request = request.body(data.clone());
            }
            None => {}
        }

        request.send().await.map_err(Into::into)
    }
}

async fn parse_body(response: reqwest::Response) -> Value {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

async fn handle_response(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    let body = parse_body(response).await;
    if status.is_success() { Ok(body) } else { Err(ClientError::Api { status, body }) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new(ClientConfig::new("http://127.0.0.1:9"), TokenStore::in_memory()).unwrap()
    }

    #[test]
    fn test_auth_paths_are_excluded_from_retry() {
        for path in AUTH_PATHS {
            assert!(is_auth_path(path), "{path} should be excluded");
        }
        assert!(is_auth_path("/api/auth/refresh"));
        assert!(!is_auth_path("/api/user"));
        assert!(!is_auth_path("/api/projects/1"));
    }

    #[tokio::test]
    async fn test_store_issuance_dual_format() {
        let m = manager();
        m.store_issuance(&json!({
            "access_token": "AT1",
            "refresh_token": "RT1",
            "expires_in": 3600,
            "user": {"id": 1}
        }))
        .unwrap();

        let auth = m.store().read().unwrap().unwrap();
        assert_eq!(auth.access_token, "AT1");
        assert_eq!(auth.refresh_token, "RT1");
        assert_eq!(m.store().user(), Some(json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_store_issuance_legacy_fallback() {
        let m = manager();
        m.store_issuance(&json!({ "token": "LEGACY", "user": {"id": 2} })).unwrap();

        let auth = m.store().read().unwrap().unwrap();
        assert_eq!(auth.access_token, "LEGACY");
        assert_eq!(auth.refresh_token, "LEGACY");
    }

    #[tokio::test]
    async fn test_store_issuance_rejects_malformed() {
        let m = manager();
        let err = m.store_issuance(&json!({ "user": {"id": 3} })).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(m.store().read().unwrap().is_none());
    }
}
