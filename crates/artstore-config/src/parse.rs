//! Typed parsing helpers shared by both process configurations.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Hardcoded fallback applied when no client or global timeout is set.
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Options for constructing outbound HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    /// Per-request timeout; resolved client-specific → global → 30 s.
    pub timeout: Option<Duration>,
    /// Additional root CA bundle to trust, when set.
    pub ca_file: Option<PathBuf>,
    /// Disable certificate verification entirely.
    pub insecure_skip_verify: bool,
}

impl HttpClientOptions {
    /// Resolve the effective timeout through the override hierarchy.
    #[must_use]
    pub fn effective_timeout(&self, global: Option<Duration>) -> Duration {
        self.timeout
            .or(global)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }
}

/// Key-set validation settings shared by both processes.
#[derive(Debug, Clone)]
pub struct AuthKeysConfig {
    /// URL of the JSON Web Key Set document.
    pub jwks_url: String,
    /// Background refresh cadence for the key set.
    pub refresh_interval: Duration,
    /// Leeway applied to token time checks.
    pub leeway: Duration,
    /// Required `iss` claim, when set.
    pub issuer: Option<String>,
}

pub(crate) fn auth_keys_config(
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigResult<AuthKeysConfig> {
    Ok(AuthKeysConfig {
        jwks_url: require(lookup, "ARTSTORE_JWKS_URL")?,
        refresh_interval: parse_duration_secs(
            lookup,
            "ARTSTORE_JWKS_REFRESH_SECS",
            Duration::from_secs(300),
        )?,
        leeway: parse_duration_secs(lookup, "ARTSTORE_JWT_LEEWAY_SECS", Duration::from_secs(30))?,
        issuer: optional(lookup, "ARTSTORE_JWT_ISSUER"),
    })
}

/// Independently configurable HTTP server timeouts.
#[derive(Debug, Clone, Copy)]
pub struct ServerTimeouts {
    /// Read timeout applied to inbound requests.
    pub read: Duration,
    /// Write timeout applied to responses.
    pub write: Duration,
    /// Idle keep-alive timeout.
    pub idle: Duration,
    /// Graceful-drain window after a shutdown signal.
    pub shutdown: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            write: Duration::from_secs(30),
            idle: Duration::from_secs(120),
            shutdown: Duration::from_secs(15),
        }
    }
}

pub(crate) fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::missing(name))
}

pub(crate) fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_port(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u16,
) -> ConfigResult<u16> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => {
            let port: u16 = raw
                .parse()
                .map_err(|_| ConfigError::invalid(name, &raw, "not_a_port"))?;
            if port == 0 {
                return Err(ConfigError::invalid(name, &raw, "zero"));
            }
            Ok(port)
        }
    }
}

pub(crate) fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> ConfigResult<Duration> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::invalid(name, &raw, "not_a_number"))?;
            if secs == 0 {
                return Err(ConfigError::invalid(name, &raw, "must_be_positive"));
            }
            Ok(Duration::from_secs(secs))
        }
    }
}

pub(crate) fn parse_optional_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<Option<Duration>> {
    match optional(lookup, name) {
        None => Ok(None),
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::invalid(name, &raw, "not_a_number"))?;
            if secs == 0 {
                return Err(ConfigError::invalid(name, &raw, "must_be_positive"));
            }
            Ok(Some(Duration::from_secs(secs)))
        }
    }
}

pub(crate) fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> ConfigResult<bool> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::invalid(name, &raw, "not_a_literal_bool")),
        },
    }
}

pub(crate) fn parse_csv(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Vec<String> {
    optional(lookup, name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_bytes(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: i64,
) -> ConfigResult<i64> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => {
            let bytes: i64 = raw
                .parse()
                .map_err(|_| ConfigError::invalid(name, &raw, "not_a_number"))?;
            if bytes < 0 {
                return Err(ConfigError::invalid(name, &raw, "negative"));
            }
            Ok(bytes)
        }
    }
}

pub(crate) fn parse_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: usize,
) -> ConfigResult<usize> {
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => {
            let value: usize = raw
                .parse()
                .map_err(|_| ConfigError::invalid(name, &raw, "not_a_number"))?;
            if value == 0 {
                return Err(ConfigError::invalid(name, &raw, "must_be_positive"));
            }
            Ok(value)
        }
    }
}

pub(crate) fn parse_log_format(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<LogFormat> {
    match optional(lookup, name) {
        None => Ok(LogFormat::Text),
        Some(raw) => match raw.as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::invalid(name, &raw, "unknown_format")),
        },
    }
}

pub(crate) fn http_client_options(
    lookup: &impl Fn(&str) -> Option<String>,
    timeout_name: &'static str,
    ca_name: &'static str,
    insecure_name: &'static str,
) -> ConfigResult<HttpClientOptions> {
    Ok(HttpClientOptions {
        timeout: parse_optional_duration_secs(lookup, timeout_name)?,
        ca_file: optional(lookup, ca_name).map(PathBuf::from),
        insecure_skip_verify: parse_bool(lookup, insecure_name, false)?,
    })
}

pub(crate) fn server_timeouts(
    lookup: &impl Fn(&str) -> Option<String>,
    read_name: &'static str,
    write_name: &'static str,
    idle_name: &'static str,
    shutdown_name: &'static str,
) -> ConfigResult<ServerTimeouts> {
    let defaults = ServerTimeouts::default();
    Ok(ServerTimeouts {
        read: parse_duration_secs(lookup, read_name, defaults.read)?,
        write: parse_duration_secs(lookup, write_name, defaults.write)?,
        idle: parse_duration_secs(lookup, idle_name, defaults.idle)?,
        shutdown: parse_duration_secs(lookup, shutdown_name, defaults.shutdown)?,
    })
}
