//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `MEETGATE_CONFIG` environment variable. A missing file is not an error: every field has a
//! default, and a deployment can be configured purely from the environment.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `MEETGATE_` override YAML values
//! 3. **Legacy variables** - `VIKA_TOKEN`, `VIKA_DATASHEET_ID`, `VIKA_VIEW_ID` and `PORT`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MEETGATE_VENDOR__REQUEST_TIMEOUT=30s` sets the `vendor.request_timeout` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Vendor credentials
//! VIKA_TOKEN=usk...
//! VIKA_DATASHEET_ID=dst...
//! VIKA_VIEW_ID=viw...
//!
//! # Override server port
//! PORT=8080
//!
//! # Override nested values
//! MEETGATE_RECORDS__CREATE_RETRY__DELAY=500ms
//! MEETGATE_UPLOADS__DIR=/var/lib/meetgate/uploads
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MEETGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Vendor datasheet connection
    pub vendor: VendorConfig,
    /// Meeting record behaviour
    pub records: RecordsConfig,
    /// Image upload handling
    pub uploads: UploadsConfig,
    /// Server-side image fetching
    pub image_proxy: ImageProxyConfig,
    /// Prebuilt frontend bundle
    pub static_assets: StaticAssetsConfig,
    pub cors: CorsConfig,
}

/// Connection settings for the Vika datasheet API.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    /// Base URL of the fusion API, e.g. `https://api.vika.cn/fusion/v1`
    pub base_url: Url,
    /// API token, sent as a bearer token on every vendor request
    pub token: String,
    /// Identifier of the datasheet holding meeting records
    pub datasheet_id: String,
    /// View used when listing records
    pub view_id: String,
    /// How the vendor keys record fields (`name` or `id`)
    pub field_key: String,
    /// Per-request timeout for vendor calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Transport-level retries for a single vendor call (connection errors, timeouts, 5xx)
    pub request_retries: u32,
    /// Delay between transport-level retries
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

// The token must never end up in logs, and Config is debug-printed at startup.
impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("datasheet_id", &self.datasheet_id)
            .field("view_id", &self.view_id)
            .field("field_key", &self.field_key)
            .field("request_timeout", &self.request_timeout)
            .field("request_retries", &self.request_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordsConfig {
    /// Retry policy wrapped around record creation
    pub create_retry: RetryConfig,
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay between consecutive attempts
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory where uploaded images are stored
    pub dir: PathBuf,
    /// Multipart field carrying the file
    pub field_name: String,
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
    /// MIME types accepted for upload, as declared by the client
    pub allowed_mime_types: Vec<String>,
    /// URL path under which `dir` is served
    pub public_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageProxyConfig {
    /// `Referer` header sent on proxied fetches, to satisfy hotlink protection
    pub referer: String,
    /// Optional overall timeout for a proxied fetch (none by default)
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticAssetsConfig {
    /// Directory containing the prebuilt frontend, served at `/`
    pub dir: PathBuf,
}

/// CORS settings. Every origin is allowed unless a list is configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// A single allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://meetings.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_otel_export: false,
            vendor: VendorConfig::default(),
            records: RecordsConfig::default(),
            uploads: UploadsConfig::default(),
            image_proxy: ImageProxyConfig::default(),
            static_assets: StaticAssetsConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.vika.cn/fusion/v1").expect("static URL is valid"),
            token: String::new(),
            datasheet_id: String::new(),
            view_id: String::new(),
            field_key: "name".to_string(),
            request_timeout: Duration::from_secs(60),
            request_retries: 5,
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            field_name: "file".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            allowed_mime_types: vec!["image/jpeg".to_string(), "image/png".to_string(), "image/gif".to_string()],
            public_path: "/uploads".to_string(),
        }
    }
}

impl Default for ImageProxyConfig {
    fn default() -> Self {
        Self {
            referer: "https://vika.cn/".to_string(),
            timeout: None,
        }
    }
}

impl Default for StaticAssetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public"),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file (silently skipped when absent)
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("MEETGATE_").split("__"))
            // Variable names used by existing deployments
            .merge(Env::raw().only(&["VIKA_TOKEN"]).map(|_| "vendor.token".into()))
            .merge(Env::raw().only(&["VIKA_DATASHEET_ID"]).map(|_| "vendor.datasheet_id".into()))
            .merge(Env::raw().only(&["VIKA_VIEW_ID"]).map(|_| "vendor.view_id".into()))
            .merge(Env::raw().only(&["PORT"]).map(|_| "port".into()))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("vendor.token", &self.vendor.token, "VIKA_TOKEN"),
            ("vendor.datasheet_id", &self.vendor.datasheet_id, "VIKA_DATASHEET_ID"),
            ("vendor.view_id", &self.vendor.view_id, "VIKA_VIEW_ID"),
        ];
        for (field, value, env) in required {
            if value.trim().is_empty() {
                return Err(Error::Internal {
                    operation: format!("Config validation: {field} is not configured. Set {env} or add it to the config file."),
                });
            }
        }

        if self.records.create_retry.max_attempts == 0 {
            return Err(Error::Internal {
                operation: "Config validation: records.create_retry.max_attempts must be at least 1".to_string(),
            });
        }

        if self.uploads.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_file_size cannot be 0".to_string(),
            });
        }

        if self.uploads.allowed_mime_types.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: uploads.allowed_mime_types cannot be empty".to_string(),
            });
        }

        if !self.uploads.public_path.starts_with('/') || self.uploads.public_path.len() < 2 {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: uploads.public_path must be an absolute sub-path such as '/uploads', got '{}'",
                    self.uploads.public_path
                ),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upper bound on how long a single create request can take before it gives up.
    ///
    /// Each local attempt wraps a vendor call that may itself be retried at the transport level,
    /// and each of those tries may run into the full request timeout.
    pub fn worst_case_create_latency(&self) -> Duration {
        let tries_per_call = self.vendor.request_retries + 1;
        let per_call =
            self.vendor.request_timeout * tries_per_call + self.vendor.retry_delay * self.vendor.request_retries;
        let attempts = self.records.create_retry.max_attempts;
        per_call * attempts + self.records.create_retry.delay * attempts.saturating_sub(1)
    }
}
