use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the gallery service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Identity provider configuration
    pub auth: AuthConfig,
    /// Payment provider configuration
    pub payment: PaymentConfig,
    /// Bulk export configuration
    #[serde(default)]
    pub export: ExportConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// How a multi-file upload reacts when one of its files fails
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    /// Let every file finish, then report one aggregate failure
    #[default]
    WaitForAll,
    /// Stop awaiting the remaining files as soon as one fails
    AbortOnFirst,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// S3 bucket holding uploaded photos
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL objects are publicly served from, without trailing slash
    pub public_base_url: String,
    /// Upload concurrency limit
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// Partial-failure policy for multi-file uploads
    #[serde(default)]
    pub upload_policy: UploadPolicy,
}

/// Identity provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity provider (GoTrue compatible)
    pub url: String,
    /// Public API key sent with every request
    pub anon_key: String,
    /// Where OAuth providers redirect back to
    #[serde(default = "default_redirect_to")]
    pub redirect_to: String,
    /// Enable the fixed guest credentials sign-in (development only)
    #[serde(default)]
    pub dev_login: bool,
    /// Guest account email
    #[serde(default = "default_guest_email")]
    pub guest_email: String,
    /// Guest account password
    #[serde(default = "default_guest_password")]
    pub guest_password: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Payment provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Endpoint creating checkout sessions
    pub checkout_url: String,
    /// Prefix the checkout session id is appended to for the redirect
    #[serde(default = "default_checkout_redirect_base")]
    pub redirect_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Bulk export configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Per-image fetch timeout in seconds
    #[serde(default = "default_export_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Maximum number of images in one archive
    #[serde(default = "default_export_max_items")]
    pub max_items: usize,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum request body in bytes (uploads)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "pika-gallery".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_upload_concurrency() -> usize {
    8
}

fn default_redirect_to() -> String {
    "http://localhost:5173".to_string()
}

fn default_guest_email() -> String {
    "guest@example.com".to_string()
}

fn default_guest_password() -> String {
    "guestpassword123".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_checkout_redirect_base() -> String {
    "https://checkout.stripe.com/c/pay/".to_string()
}

fn default_export_fetch_timeout_secs() -> u64 {
    60
}

fn default_export_max_items() -> usize {
    500
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    64 * 1024 * 1024 // 64MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("service.name", "pika-gallery")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/pika/gallery").required(false))
            // PIKA__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("PIKA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "storage.upload_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.export.max_items == 0 {
            return Err(ConfigError::InvalidValue {
                key: "export.max_items".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get per-image export fetch timeout as Duration
    pub fn export_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.export.fetch_timeout_secs)
    }
}

impl DatabaseConfig {
    /// Get connection acquire timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle connection timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_export_fetch_timeout_secs(),
            max_items: default_export_max_items(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            body_limit_bytes: default_body_limit(),
        }
    }
}
