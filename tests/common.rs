use axum::extract::Request;
use axum::middleware::Next;
use keygate::api::{self, MgmtState};
use keygate::client::{AuthManager, Clock, ClientConfig, SystemClock, TokenStore};
use keygate::config::{AuthConfig, Config, LogFormat, RateLimitConfig, ServerConfig, TelemetryConfig};
use keygate::services::auth_service::AuthService;
use keygate::services::health_service::HealthService;
use keygate::storage::memory::{MemoryCredentialStore, MemoryUserStore};
use keygate::storage::{CredentialStore, UserStore};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("keygate=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }

    pub fn advance(&self, delta_ms: i64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-path request counter, wrapped around the whole router.
#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<Mutex<HashMap<String, usize>>>);

impl Hits {
    pub fn count(&self, path: &str) -> usize {
        self.0.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn record(&self, path: &str) {
        *self.0.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused-in-tests".to_string(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            mgmt_port: 0,
            shutdown_timeout_secs: 1,
        },
        auth: AuthConfig {
            access_token_ttl_mins: 60,
            refresh_token_ttl_mins: 10_080,
            credential_sweep_interval_secs: 0,
        },
        rate_limit: RateLimitConfig { per_second: 10_000, burst: 10_000, auth_per_second: 10_000, auth_burst: 10_000 },
        telemetry: TelemetryConfig { otlp_endpoint: None, log_format: LogFormat::Text },
    }
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub credentials: Arc<MemoryCredentialStore>,
    pub hits: Hits,
}

impl TestApp {
    pub async fn spawn() -> Self {
        setup_tracing();

        let config = test_config();
        let users: Arc<MemoryUserStore> = Arc::new(MemoryUserStore::new());
        let credentials: Arc<MemoryCredentialStore> = Arc::new(MemoryCredentialStore::new());

        let users_dyn: Arc<dyn UserStore> = Arc::clone(&users) as Arc<dyn UserStore>;
        let credentials_dyn: Arc<dyn CredentialStore> = Arc::clone(&credentials) as Arc<dyn CredentialStore>;

        let auth_service = AuthService::new(config.auth.clone(), Arc::clone(&users_dyn), Arc::clone(&credentials_dyn));
        let health_service = HealthService::new(users_dyn, Arc::clone(&credentials_dyn));

        let hits = Hits::default();
        let counting = hits.clone();
        let router = api::app_router(config, auth_service, credentials_dyn).layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let counting = counting.clone();
                async move {
                    counting.record(req.uri().path());
                    next.run(req).await
                }
            },
        ));
        let mgmt = api::mgmt_router(MgmtState { health_service });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind api listener");
        let addr = listener.local_addr().expect("api listener addr");
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .expect("api server");
        });

        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mgmt listener");
        let mgmt_addr = mgmt_listener.local_addr().expect("mgmt listener addr");
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .expect("mgmt server");
        });

        Self {
            server_url: format!("http://{addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            credentials,
            hits,
        }
    }

    /// Registers a user and returns the issuance response body.
    pub async fn register_user(&self, email: &str) -> serde_json::Value {
        let resp = self
            .client
            .post(format!("{}/api/register", self.server_url))
            .json(&json!({ "name": "Test User", "email": email, "password": "password12345" }))
            .send()
            .await
            .expect("register request");
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED, "registration should succeed");
        resp.json().await.expect("registration body")
    }

    /// An auth manager pointed at this app, sharing the given clock between
    /// the manager's store and the test.
    pub fn manager_with_clock(&self, clock: Arc<dyn Clock>, check_interval: Duration) -> AuthManager {
        let store = TokenStore::new(Arc::new(keygate::client::MemoryBackend::new()), clock);
        let mut config = ClientConfig::new(self.server_url.clone());
        config.expiry_check_interval = check_interval;
        config.request_timeout = Duration::from_secs(5);
        AuthManager::new(config, store).expect("build auth manager")
    }

    pub fn manager(&self) -> AuthManager {
        self.manager_with_clock(Arc::new(SystemClock), Duration::from_secs(60))
    }
}
