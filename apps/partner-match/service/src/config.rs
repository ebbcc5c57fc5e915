use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_LOG_REQUESTS: bool = true;
const DEFAULT_SERVICE_USER: &str = "partner_match";
const DEFAULT_COOKIE_MAX_AGE_SECONDS: u64 = 31_536_000;
const DEFAULT_COOKIE_CROSS_SITE: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub log_format: LogFormat,
    pub log_requests: bool,
    pub store_path: Option<PathBuf>,
    pub service_user: String,
    pub service_password: Option<String>,
    pub cookie_max_age_seconds: u64,
    /// Marks the identity cookie `SameSite=None; Secure` so browsers return it
    /// on credentialed cross-site `/sync` calls; otherwise `SameSite=Lax`.
    pub cookie_cross_site: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PM_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid PM_LOG_FORMAT value '{value}': expected 'text' or 'json'")]
    InvalidLogFormat { value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("PM_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw.clone(),
                source,
            })?;

        let log_filter = env::var("PM_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_format = match env::var("PM_LOG_FORMAT")
            .ok()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .as_deref()
        {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidLogFormat {
                    value: other.to_string(),
                });
            }
        };

        let log_requests = env::var("PM_LOG_REQUESTS")
            .ok()
            .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(DEFAULT_LOG_REQUESTS);

        let store_path = env::var("PM_STORE_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let service_user = env::var("PM_SERVICE_USER")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE_USER.to_string());

        let service_password = env::var("PM_SERVICE_PASSWORD")
            .ok()
            .filter(|value| !value.is_empty());

        let cookie_max_age_seconds = env::var("PM_COOKIE_MAX_AGE_SECONDS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_COOKIE_MAX_AGE_SECONDS);

        let cookie_cross_site = env::var("PM_COOKIE_CROSS_SITE")
            .ok()
            .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(DEFAULT_COOKIE_CROSS_SITE);

        Ok(Self {
            bind_addr,
            log_filter,
            log_format,
            log_requests,
            store_path,
            service_user,
            service_password,
            cookie_max_age_seconds,
            cookie_cross_site,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            log_format: LogFormat::Text,
            log_requests: false,
            store_path: None,
            service_user: "partner_match_test".to_string(),
            service_password: Some("test-password".to_string()),
            cookie_max_age_seconds: DEFAULT_COOKIE_MAX_AGE_SECONDS,
            cookie_cross_site: DEFAULT_COOKIE_CROSS_SITE,
        }
    }
}
