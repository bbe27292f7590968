//! Configuration management for DeepSearch services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Entity extraction service configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Upload policy
    #[serde(default)]
    pub upload: UploadConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origins (empty allows any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending migrations at startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing (required at startup)
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage provider: s3, memory
    #[serde(default = "default_storage_provider")]
    pub provider: String,

    /// Bucket holding uploaded documents
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix for uploaded documents
    #[serde(default = "default_folder")]
    pub folder: String,

    /// AWS region (falls back to the SDK's default chain)
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint: Option<String>,

    /// Public base URL used to build object addresses
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Extraction provider: gemini
    #[serde(default = "default_extraction_provider")]
    pub provider: String,

    /// API key for the language-model service; extraction is skipped when absent
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_extraction_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Characters of cleaned text sent to the model
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Multipart field carrying the file
    #[serde(default = "default_field_name")]
    pub field_name: String,

    /// Length of text previews in upload responses
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Delete the stored blob when the document record cannot be persisted
    #[serde(default = "default_enabled")]
    pub cleanup_orphaned_blobs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / filter directive (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_storage_provider() -> String { "s3".to_string() }
fn default_bucket() -> String { "deepsearch".to_string() }
fn default_folder() -> String { "deepsearch_pdfs".to_string() }
fn default_extraction_provider() -> String { "gemini".to_string() }
fn default_extraction_api_base() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_extraction_model() -> String { crate::DEFAULT_EXTRACTION_MODEL.to_string() }
fn default_max_chars() -> usize { 10_000 }
fn default_extraction_timeout() -> u64 { 30 }
fn default_max_file_bytes() -> usize { crate::DEFAULT_MAX_FILE_BYTES }
fn default_field_name() -> String { "pdf".to_string() }
fn default_preview_chars() -> usize { 100 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "deepsearch".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            bucket: default_bucket(),
            folder: default_folder(),
            region: None,
            endpoint: None,
            public_base_url: None,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_extraction_provider(),
            api_key: None,
            api_base: default_extraction_api_base(),
            model: default_extraction_model(),
            max_chars: default_max_chars(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            field_name: default_field_name(),
            preview_chars: default_preview_chars(),
            cleanup_orphaned_blobs: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__EXTRACTION__API_KEY=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// The JWT signing secret, or a configuration error when unset or blank
    pub fn jwt_secret(&self) -> crate::Result<&str> {
        self.auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| crate::AppError::Configuration {
                message: "auth.jwt_secret must be set (APP__AUTH__JWT_SECRET)".to_string(),
            })
    }

    /// Whether an entity extraction credential is configured
    pub fn extraction_enabled(&self) -> bool {
        self.extraction
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/deepsearch".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: default_enabled(),
            },
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            extraction: ExtractionConfig::default(),
            upload: UploadConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.extraction.model, "gemini-2.0-flash");
        assert_eq!(config.extraction.max_chars, 10_000);
        assert_eq!(config.upload.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload.field_name, "pdf");
        assert_eq!(config.storage.folder, "deepsearch_pdfs");
    }

    #[test]
    fn test_jwt_secret_required() {
        let mut config = AppConfig::default();
        assert!(config.jwt_secret().is_err());

        config.auth.jwt_secret = Some("   ".to_string());
        assert!(config.jwt_secret().is_err());

        config.auth.jwt_secret = Some("s3cret".to_string());
        assert_eq!(config.jwt_secret().unwrap(), "s3cret");
    }

    #[test]
    fn test_extraction_enabled_requires_key() {
        let mut config = AppConfig::default();
        assert!(!config.extraction_enabled());

        config.extraction.api_key = Some(String::new());
        assert!(!config.extraction_enabled());

        config.extraction.api_key = Some("key".to_string());
        assert!(config.extraction_enabled());
    }
}
