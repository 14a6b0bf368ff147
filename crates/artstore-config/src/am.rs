//! Admin Module process configuration.

use std::time::Duration;

use crate::error::ConfigResult;
use crate::parse::{
    self, AuthKeysConfig, HttpClientOptions, LogFormat, ServerTimeouts, optional,
    parse_duration_secs, parse_log_format, parse_port, parse_usize, require,
};

/// Relational database connection fields.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
}

impl DatabaseConfig {
    /// Connection URL for the pool constructor. The password is embedded in
    /// the URL and must never be logged.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// OpenID Connect provider settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Base URL of the provider.
    pub url: String,
    /// Realm name.
    pub realm: String,
    /// Client id used by the Admin Module itself.
    pub client_id: String,
    /// Client secret for the client-credentials grant.
    pub client_secret: String,
    /// Redirect URL registered for the authorization-code flow.
    pub redirect_url: String,
    /// Groups granting the admin role.
    pub admin_groups: Vec<String>,
    /// Groups granting the readonly role.
    pub readonly_groups: Vec<String>,
}

/// Fully validated configuration for the Admin Module process.
#[derive(Debug, Clone)]
pub struct AmConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Tracing filter directive.
    pub log_level: String,
    /// Tracing output format.
    pub log_format: LogFormat,
    /// Database connection fields.
    pub database: DatabaseConfig,
    /// Identity provider settings.
    pub oidc: OidcConfig,
    /// Key-set validation settings.
    pub auth_keys: AuthKeysConfig,
    /// File-registry synchronization cadence.
    pub file_sync_interval: Duration,
    /// Service-account synchronization cadence.
    pub sa_sync_interval: Duration,
    /// Status-stream snapshot cadence.
    pub event_interval: Duration,
    /// Dependency-health evaluation cadence.
    pub health_interval: Duration,
    /// Page size used when enumerating files from an element.
    pub sync_page_size: usize,
    /// Prefix identifying synchronized service-account clients.
    pub sa_prefix: String,
    /// Outbound client options for Storage Element calls.
    pub se_client: HttpClientOptions,
    /// Outbound client options for identity provider calls.
    pub idp_client: HttpClientOptions,
    /// Global outbound timeout applied when a client has none.
    pub http_timeout: Option<Duration>,
    /// HTTP server timeouts.
    pub server: ServerTimeouts,
}

impl AmConfig {
    /// Load the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ConfigError`] naming the first missing or invalid
    /// variable.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ConfigError`] naming the first missing or invalid
    /// variable.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let database = DatabaseConfig {
            host: require(lookup, "ARTSTORE_DB_HOST")?,
            port: parse_port(lookup, "ARTSTORE_DB_PORT", 5432)?,
            name: require(lookup, "ARTSTORE_DB_NAME")?,
            user: require(lookup, "ARTSTORE_DB_USER")?,
            password: require(lookup, "ARTSTORE_DB_PASSWORD")?,
        };
        let oidc = OidcConfig {
            url: require(lookup, "ARTSTORE_OIDC_URL")?,
            realm: require(lookup, "ARTSTORE_OIDC_REALM")?,
            client_id: require(lookup, "ARTSTORE_OIDC_CLIENT_ID")?,
            client_secret: require(lookup, "ARTSTORE_OIDC_CLIENT_SECRET")?,
            redirect_url: require(lookup, "ARTSTORE_OIDC_REDIRECT_URL")?,
            admin_groups: parse::parse_csv(lookup, "ARTSTORE_ADMIN_GROUPS"),
            readonly_groups: parse::parse_csv(lookup, "ARTSTORE_READONLY_GROUPS"),
        };

        Ok(Self {
            port: parse_port(lookup, "ARTSTORE_AM_PORT", 8080)?,
            log_level: optional(lookup, "ARTSTORE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_log_format(lookup, "ARTSTORE_LOG_FORMAT")?,
            database,
            oidc,
            auth_keys: parse::auth_keys_config(lookup)?,
            file_sync_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_FILE_SYNC_INTERVAL_SECS",
                Duration::from_secs(3600),
            )?,
            sa_sync_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_SA_SYNC_INTERVAL_SECS",
                Duration::from_secs(900),
            )?,
            event_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_EVENT_INTERVAL_SECS",
                Duration::from_secs(15),
            )?,
            health_interval: parse_duration_secs(
                lookup,
                "ARTSTORE_HEALTH_INTERVAL_SECS",
                Duration::from_secs(30),
            )?,
            sync_page_size: parse_usize(lookup, "ARTSTORE_SYNC_PAGE_SIZE", 500)?,
            sa_prefix: optional(lookup, "ARTSTORE_SA_PREFIX").unwrap_or_else(|| "sa_".to_string()),
            se_client: parse::http_client_options(
                lookup,
                "ARTSTORE_SE_TIMEOUT_SECS",
                "ARTSTORE_HTTP_CA_FILE",
                "ARTSTORE_HTTP_INSECURE_SKIP_VERIFY",
            )?,
            idp_client: parse::http_client_options(
                lookup,
                "ARTSTORE_IDP_TIMEOUT_SECS",
                "ARTSTORE_HTTP_CA_FILE",
                "ARTSTORE_HTTP_INSECURE_SKIP_VERIFY",
            )?,
            http_timeout: parse::parse_optional_duration_secs(
                lookup,
                "ARTSTORE_HTTP_CLIENT_TIMEOUT_SECS",
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
