//! Storage Element process configuration.

use std::path::PathBuf;
use std::time::Duration;

use artstore_model::{InstanceRole, OperatingMode, ReplicaMode};

use crate::error::{ConfigError, ConfigResult};
use crate::parse::{
    self, AuthKeysConfig, HttpClientOptions, LogFormat, ServerTimeouts, optional, parse_bytes,
    parse_duration_secs, parse_log_format, parse_port, require,
};

/// Fully validated configuration for a Storage Element process.
#[derive(Debug, Clone)]
pub struct SeConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Tracing filter directive, e.g. `info` or `artstore=debug`.
    pub log_level: String,
    /// Tracing output format.
    pub log_format: LogFormat,
    /// Directory holding blobs and sidecars.
    pub data_dir: PathBuf,
    /// Self-declared element identifier reported by `/info`.
    pub storage_id: String,
    /// Configured capacity limit in bytes.
    pub capacity_bytes: i64,
    /// Mode applied when no persisted marker exists.
    pub default_mode: OperatingMode,
    /// Garbage-collector cadence.
    pub gc_interval: Duration,
    /// Reconciler cadence.
    pub reconcile_interval: Duration,
    /// Deployment flavour.
    pub replica_mode: ReplicaMode,
    /// Declarative instance role.
    pub instance_role: InstanceRole,
    /// Leader address, meaningful only for followers.
    pub leader_url: Option<String>,
    /// Key-set validation settings.
    pub auth_keys: AuthKeysConfig,
    /// Outbound HTTP client options (JWKS fetch).
    pub http_client: HttpClientOptions,
    /// HTTP server timeouts.
    pub server: ServerTimeouts,
}

impl SeConfig {
    /// Load the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid
    /// variable.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid
    /// variable.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let default_mode = match optional(lookup, "ARTSTORE_SE_DEFAULT_MODE") {
            None => OperatingMode::Rw,
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::invalid("ARTSTORE_SE_DEFAULT_MODE", &raw, "unknown_mode")
            })?,
        };
        let replica_mode = match optional(lookup, "ARTSTORE_SE_REPLICA_MODE") {
            None => ReplicaMode::Standalone,
            Some(raw) => match raw.as_str() {
                "standalone" => ReplicaMode::Standalone,
                "replicated" => ReplicaMode::Replicated,
                _ => {
                    return Err(ConfigError::invalid(
                        "ARTSTORE_SE_REPLICA_MODE",
                        &raw,
                        "unknown_replica_mode",
                    ));
                }
            },
        };
        let instance_role = match optional(lookup, "ARTSTORE_SE_INSTANCE_ROLE") {
            None => InstanceRole::Standalone,
            Some(raw) => match raw.as_str() {
                "standalone" => InstanceRole::Standalone,
                "leader" => InstanceRole::Leader,
                "follower" => InstanceRole::Follower,
                _ => {
                    return Err(ConfigError::invalid(
                        "ARTSTORE_SE_INSTANCE_ROLE",
                        &raw,
                        "unknown_instance_role",
                    ));
                }
            },
        };

        Ok(Self {
            port: parse_port(lookup, "ARTSTORE_SE_PORT", 8081)?,
            log_level: optional(lookup, "ARTSTORE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_log_format(lookup, "ARTSTORE_LOG_FORMAT")?,
            data_dir: PathBuf::from(require(lookup, "ARTSTORE_SE_DATA_DIR")?),
            storage_id: require(lookup, "ARTSTORE_SE_STORAGE_ID")?,
            capacity_bytes: parse_bytes(lookup, "ARTSTORE_SE_CAPACITY_BYTES", 0)?,
            default_mode,
            gc_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_SE_GC_INTERVAL_SECS",
                Duration::from_secs(900),
            )?,
            reconcile_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_SE_RECONCILE_INTERVAL_SECS",
                Duration::from_secs(3600),
            )?,
            replica_mode,
            instance_role,
            leader_url: optional(lookup, "ARTSTORE_SE_LEADER_URL"),
            auth_keys: parse::auth_keys_config(lookup)?,
            http_client: parse::http_client_options(
                lookup,
                "ARTSTORE_HTTP_CLIENT_TIMEOUT_SECS",
                "ARTSTORE_HTTP_CA_FILE",
                "ARTSTORE_HTTP_INSECURE_SKIP_VERIFY",
            )?,
            server: parse::server_timeouts(
                lookup,
                "ARTSTORE_HTTP_READ_TIMEOUT_SECS",
                "ARTSTORE_HTTP_WRITE_TIMEOUT_SECS",
                "ARTSTORE_HTTP_IDLE_TIMEOUT_SECS",
                "ARTSTORE_SHUTDOWN_TIMEOUT_SECS",
            )?,
        })
    }
}
