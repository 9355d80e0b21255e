use chrono::Duration as ChronoDuration;
use domain::services::RetryPolicy;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight deliveries and jobs on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Delivery pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    /// HTTP attempts per delivery before it is marked permanently failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Age after which a delivery is no longer retried (default: 7200 = 2 hours)
    #[serde(default = "default_retry_deadline")]
    pub retry_deadline_secs: i64,

    /// Per-attempt HTTP timeout
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// How long a worker's claim on a delivery stays valid
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,

    /// Maximum deliveries attempted concurrently
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Capacity of the in-process delivery queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How often the retry job scans for due deliveries
    #[serde(default = "default_retry_poll_interval")]
    pub retry_poll_interval_secs: u64,

    /// Deliveries re-enqueued per retry job run
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: i64,

    #[serde(default = "default_max_endpoints_per_owner")]
    pub max_endpoints_per_owner: i64,

    /// Delay before a delivery skipped for a missing or inactive endpoint is
    /// picked up by the retry job again
    #[serde(default = "default_skip_recheck")]
    pub skip_recheck_secs: i64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_deadline_secs: default_retry_deadline(),
            attempt_timeout_secs: default_attempt_timeout(),
            claim_lease_secs: default_claim_lease(),
            worker_concurrency: default_worker_concurrency(),
            queue_capacity: default_queue_capacity(),
            retry_poll_interval_secs: default_retry_poll_interval(),
            retry_batch_size: default_retry_batch_size(),
            max_endpoints_per_owner: default_max_endpoints_per_owner(),
            skip_recheck_secs: default_skip_recheck(),
        }
    }
}

impl WebhooksConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            ChronoDuration::seconds(self.retry_deadline_secs),
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn claim_lease(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.claim_lease_secs)
    }

    pub fn skip_recheck(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.skip_recheck_secs)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    35
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_max_attempts() -> i32 {
    domain::services::DEFAULT_MAX_ATTEMPTS
}
fn default_retry_deadline() -> i64 {
    domain::services::DEFAULT_RETRY_DEADLINE_SECS
}
fn default_attempt_timeout() -> u64 {
    30
}
fn default_claim_lease() -> i64 {
    60
}
fn default_worker_concurrency() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_retry_poll_interval() -> u64 {
    30
}
fn default_retry_batch_size() -> i64 {
    100
}
fn default_max_endpoints_per_owner() -> i64 {
    25
}
fn default_skip_recheck() -> i64 {
    60
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CRM__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CRM").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system. Validation is skipped.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""

            [logging]
            level = "info"
            format = "json"

            [webhooks]
            max_attempts = 5
            retry_deadline_secs = 7200
            attempt_timeout_secs = 30
            claim_lease_secs = 60
            worker_concurrency = 8
            queue_capacity = 1024
            retry_poll_interval_secs = 30
            retry_batch_size = 100
            max_endpoints_per_owner = 25
            skip_recheck_secs = 60
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CRM__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let webhooks = &self.webhooks;
        if !(1..=10).contains(&webhooks.max_attempts) {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.max_attempts must be between 1 and 10".to_string(),
            ));
        }
        if webhooks.retry_deadline_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.retry_deadline_secs must be positive".to_string(),
            ));
        }
        if webhooks.attempt_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.attempt_timeout_secs must be positive".to_string(),
            ));
        }
        if webhooks.claim_lease_secs <= webhooks.attempt_timeout_secs as i64 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.claim_lease_secs must exceed attempt_timeout_secs".to_string(),
            ));
        }
        if webhooks.worker_concurrency == 0 || webhooks.queue_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.worker_concurrency and queue_capacity must be non-zero".to_string(),
            ));
        }
        if webhooks.skip_recheck_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.skip_recheck_secs must be positive".to_string(),
            ));
        }
        if webhooks.retry_poll_interval_secs == 0 || webhooks.retry_batch_size <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "webhooks.retry_poll_interval_secs and retry_batch_size must be positive"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}
