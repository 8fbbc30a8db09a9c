use crate::mcp::ToolMode;
use std::path::PathBuf;

pub const ENV_HOST: &str = "UNIFI_HOST";
pub const ENV_API_KEY: &str = "UNIFI_API_KEY";
pub const ENV_VERIFY_SSL: &str = "UNIFI_VERIFY_SSL";
pub const ENV_API_PREFIX: &str = "UNIFI_API_PREFIX";
pub const ENV_TOOL_MODE: &str = "UNIFI_TOOL_MODE";
pub const ENV_CATALOG: &str = "UNIFI_CATALOG";

/// Path prefix of the Network application on UniFi OS consoles.
pub const DEFAULT_API_PREFIX: &str = "/proxy/network";

/// Controller connection and server settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Controller base URL, e.g. `https://192.168.1.1`
    pub host: String,
    /// Sent as `X-API-KEY` on every request
    pub api_key: String,
    pub verify_ssl: bool,
    pub api_prefix: String,
    pub mode: ToolMode,
    /// Resource catalog overriding the built-in one
    pub catalog: Option<PathBuf>,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("UNIFI_HOST is required")]
    MissingHost,
    #[error("UNIFI_API_KEY is required")]
    MissingCredentials,
    #[error("Invalid {name}: '{value}' (expected true/false, 1/0 or yes/no)")]
    InvalidBool { name: &'static str, value: String },
    #[error("Invalid UNIFI_TOOL_MODE: {0}")]
    InvalidMode(String),
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get(ENV_HOST).ok_or(ConfigError::MissingHost)?;
        let api_key = get(ENV_API_KEY).ok_or(ConfigError::MissingCredentials)?;

        let verify_ssl = match get(ENV_VERIFY_SSL) {
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                name: ENV_VERIFY_SSL,
                value,
            })?,
            None => true,
        };

        let mode = match get(ENV_TOOL_MODE) {
            Some(value) => value.parse().map_err(ConfigError::InvalidMode)?,
            None => ToolMode::default(),
        };

        Ok(Self {
            host,
            api_key,
            verify_ssl,
            // An explicitly empty prefix is honoured for classic controllers
            api_prefix: lookup(ENV_API_PREFIX)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string()),
            mode,
            catalog: get(ENV_CATALOG).map(PathBuf::from),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
