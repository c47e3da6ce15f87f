use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "KEYGATE_DATABASE_URL")]
    pub database_url: String,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "KEYGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "KEYGATE_PORT", default_value_t = 8001)]
    pub port: u16,

    /// Port for the management server (health probes)
    #[arg(long, env = "KEYGATE_MGMT_PORT", default_value_t = 8002)]
    pub mgmt_port: u16,

    /// How long to wait for background tasks during shutdown
    #[arg(long, env = "KEYGATE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Access token time-to-live in minutes
    #[arg(long, env = "KEYGATE_ACCESS_TOKEN_TTL_MINS", default_value_t = 60)]
    pub access_token_ttl_mins: i64,

    /// Refresh token time-to-live in minutes (default 7 days)
    #[arg(long, env = "KEYGATE_REFRESH_TOKEN_TTL_MINS", default_value_t = 10_080)]
    pub refresh_token_ttl_mins: i64,

    /// How often to sweep expired credentials (0 disables the sweeper)
    #[arg(long, env = "KEYGATE_CREDENTIAL_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub credential_sweep_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed for standard endpoints
    #[arg(long, env = "KEYGATE_RATE_LIMIT_PER_SECOND", default_value_t = 10)]
    pub per_second: u32,

    /// Burst allowance for standard endpoints
    #[arg(long, env = "KEYGATE_RATE_LIMIT_BURST", default_value_t = 20)]
    pub burst: u32,

    /// Stricter rate limit for expensive auth-related endpoints (register/login)
    #[arg(long, env = "KEYGATE_AUTH_RATE_LIMIT_PER_SECOND", default_value_t = 1)]
    pub auth_per_second: u32,

    /// Burst allowance for expensive auth-related endpoints
    #[arg(long, env = "KEYGATE_AUTH_RATE_LIMIT_BURST", default_value_t = 5)]
    pub auth_burst: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; telemetry export is disabled when unset
    #[arg(long, env = "KEYGATE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "KEYGATE_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
