//! Tracing subscriber bootstrap.

use artstore_config::LogFormat;
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the global tracing subscriber.
///
/// The filter directive comes from configuration (`info`,
/// `artstore=debug,sqlx=warn`, …); the format selects single-line text or
/// JSON output. Subsequent calls are no-ops so tests may call this freely.
pub fn init_tracing(level: &str, format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match format {
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(true)
                    .init();
            }
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .json()
                    .with_current_span(false)
                    .init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_idempotent() {
        init_tracing("info", LogFormat::Text);
        init_tracing("debug", LogFormat::Json);
    }
}
