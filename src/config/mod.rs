//! Configuration module for the SousChef bridge server.
//!
//! Configuration comes from a YAML file, environment variables, and `.env`
//! values, in that priority order: YAML > ENV vars > defaults. The upstream
//! AI services are configured here but never called during loading.

use std::path::PathBuf;

use thiserror::Error;

mod yaml;

/// Default WebSocket endpoint for the Live Session Service.
pub const DEFAULT_LIVE_API_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default model for the Live Session Service.
pub const DEFAULT_LIVE_MODEL: &str = "gpt-4o-realtime-preview";

/// Default base URL for the Completion Service.
pub const DEFAULT_COMPLETION_API_URL: &str = "https://api.openai.com/v1";

/// Default model for the Completion Service.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge server:
/// - Server settings (host, port, TLS)
/// - Live Session Service endpoint and credentials
/// - Completion Service endpoint and credentials
/// - Assistant grounding instructions
/// - Security settings (CORS) and session timeouts
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Live Session Service WebSocket endpoint
    pub live_api_url: String,
    /// Bearer token for the live service; falls back to `OPENAI_API_KEY`
    pub live_api_key: Option<String>,
    pub live_model: String,

    /// Completion Service base URL
    pub completion_api_url: String,
    /// Bearer token for the completion service; falls back to `OPENAI_API_KEY`
    pub completion_api_key: Option<String>,
    pub completion_model: String,

    /// Extra grounding instructions appended to every assistant prompt
    pub assistant_instructions: Option<String>,

    /// Comma-separated CORS origins, or `*`; None means same-origin only
    pub cors_allowed_origins: Option<String>,

    /// Voice sessions idle longer than this are closed
    pub idle_timeout_seconds: u64,
    /// Deadline for the live service handshake before falling back
    pub connect_timeout_seconds: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let shared_key = read_env("OPENAI_API_KEY");

        let tls = match (read_env("TLS_CERT_PATH"), read_env("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };

        Ok(Self {
            host: read_env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: read_env_parsed("PORT")?.unwrap_or(8080),
            tls,
            live_api_url: read_env("LIVE_API_URL")
                .unwrap_or_else(|| DEFAULT_LIVE_API_URL.to_string()),
            live_api_key: read_env("LIVE_API_KEY").or_else(|| shared_key.clone()),
            live_model: read_env("LIVE_MODEL").unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            completion_api_url: read_env("COMPLETION_API_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_API_URL.to_string()),
            completion_api_key: read_env("COMPLETION_API_KEY").or(shared_key),
            completion_model: read_env("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            assistant_instructions: read_env("ASSISTANT_INSTRUCTIONS"),
            cors_allowed_origins: read_env("CORS_ALLOWED_ORIGINS"),
            idle_timeout_seconds: read_env_parsed("IDLE_TIMEOUT_SECONDS")?.unwrap_or(300),
            connect_timeout_seconds: read_env_parsed("CONNECT_TIMEOUT_SECONDS")?.unwrap_or(10),
        })
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves unset.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let base = Self::from_env()?;
        yaml::merge_from_file(base, path)
    }

    /// Listen address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_seconds)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match read_env(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(None),
    }
}
