//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `OCRGW_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `OCRGW_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `OCRGW_UPSTREAM__TIMEOUT=30s` sets the `upstream.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use ocrgw::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Forwarding uploads to {}", config.upstream.endpoint());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! OCRGW_PORT=8080
//!
//! # Point the gateway at an on-premise recognition service
//! OCRGW_UPSTREAM__URL="http://192.168.0.160:30020/ai/service/v2/recognize/table/multipage"
//!
//! # Give slow multi-page documents more time
//! OCRGW_UPSTREAM__TIMEOUT=2m
//! ```

use anyhow::bail;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Table recognition endpoint used when no upstream URL is configured.
pub const DEFAULT_UPSTREAM_URL: &str = "http://leda-textin.seadeep.ai/ai/service/v2/recognize/table/multipage?excel=1";

/// Query parameter asking the upstream service to include the spreadsheet rendition.
pub const EXCEL_QUERY_FLAG: &str = "excel";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "OCRGW_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation, so an empty config file
/// produces a gateway listening on port 5000 that forwards to [`DEFAULT_UPSTREAM_URL`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// The OCR service uploads are forwarded to
    pub upstream: UpstreamConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Maximum accepted request body size in bytes
    pub max_upload_size: usize,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upstream: UpstreamConfig::default(),
            cors: CorsConfig::default(),
            max_upload_size: 50 * 1024 * 1024,
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

/// Upstream OCR service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Recognition endpoint. `excel=1` is appended when the URL carries no `excel` parameter.
    pub url: Url,
    /// Upper bound for a whole upstream exchange, upload through response body
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Upper bound for establishing the upstream connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream URL is valid"),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl UpstreamConfig {
    /// The URL requests are actually sent to, with the spreadsheet flag guaranteed present.
    pub fn endpoint(&self) -> Url {
        let mut url = self.url.clone();
        if !url.query_pairs().any(|(key, _)| key == EXCEL_QUERY_FLAG) {
            url.query_pairs_mut().append_pair(EXCEL_QUERY_FLAG, "1");
        }
        url
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this long
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
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

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.upstream.url.scheme(), "http" | "https") {
            bail!(
                "Config validation: upstream.url must use http or https, got '{}'",
                self.upstream.url.scheme()
            );
        }

        if self.upstream.timeout.is_zero() {
            bail!("Config validation: upstream.timeout must be greater than zero");
        }

        if self.upstream.connect_timeout.is_zero() {
            bail!("Config validation: upstream.connect_timeout must be greater than zero");
        }

        if self.max_upload_size == 0 {
            bail!("Config validation: max_upload_size must be greater than zero");
        }

        if self.cors.allowed_origins.is_empty() {
            bail!("Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.");
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            bail!("Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.");
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // OCRGW_CONFIG names the file itself and is not a config key
            .merge(Env::prefixed("OCRGW_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
