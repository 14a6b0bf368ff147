//! Outbound HTTP client construction honouring the TLS and timeout options.

use std::time::Duration;

use artstore_config::HttpClientOptions;
use reqwest::{Certificate, Client};

use crate::error::{AuthError, AuthResult};

/// Build a `reqwest` client from the shared options.
///
/// The effective timeout resolves client-specific → global → the hardcoded
/// 30 s fallback. An extra CA bundle, when configured, is appended to the
/// trust store; `insecure_skip_verify` disables verification entirely and is
/// intended for lab deployments only.
///
/// # Errors
///
/// Returns an error when the CA bundle cannot be read or the client cannot
/// be constructed.
pub fn build_http_client(
    options: &HttpClientOptions,
    global_timeout: Option<Duration>,
) -> AuthResult<Client> {
    let mut builder = Client::builder().timeout(options.effective_timeout(global_timeout));

    if let Some(path) = &options.ca_file {
        let pem = std::fs::read(path).map_err(|source| AuthError::CaBundle {
            path: path.clone(),
            source,
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|source| AuthError::CaParse {
            path: path.clone(),
            source,
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    if options.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|source| AuthError::ClientBuild { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let client = build_http_client(&HttpClientOptions::default(), None);
        assert!(client.is_ok());
    }

    #[test]
    fn missing_ca_bundle_is_reported() {
        let options = HttpClientOptions {
            ca_file: Some("/nonexistent/bundle.pem".into()),
            ..HttpClientOptions::default()
        };
        assert!(matches!(
            build_http_client(&options, None),
            Err(AuthError::CaBundle { .. })
        ));
    }
}
