use std::io::IsTerminal;

use scope_auth_config::log::{LogFormat, LoggingConfig};
use tracing_subscriber::{
    filter::ParseError, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError, EnvFilter, Layer,
};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter \"{0}\": {1}")]
    InvalidFilter(String, #[source] ParseError),
    #[error("Failed to install the global subscriber: {0}")]
    Init(#[from] TryInitError),
}

pub fn create_env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let directives = config.env_filter_str();
    EnvFilter::try_new(directives)
        .map_err(|err| LoggingError::InvalidFilter(directives.to_string(), err))
}

/// Installs the global subscriber: stdout, compact text or flattened JSON.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = create_env_filter(config)?;
    let is_terminal = std::io::stdout().is_terminal();
    let timer = UtcTime::rfc_3339();
    let stdout_layer = tracing_subscriber::fmt::layer();

    let layer = match config.format {
        LogFormat::Json => stdout_layer
            .json()
            .with_timer(timer)
            .with_thread_ids(false)
            .with_target(false)
            .with_ansi(is_terminal)
            .flatten_event(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Text => stdout_layer
            .compact()
            .with_thread_ids(false)
            .with_timer(timer)
            .with_target(false)
            .with_ansi(is_terminal)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_prefers_explicit_directives() {
        let config = LoggingConfig {
            filter: Some("scope_auth=trace,warn".to_string()),
            ..Default::default()
        };
        let filter = create_env_filter(&config).unwrap().to_string();
        assert!(filter.contains("scope_auth=trace"));
    }

    #[test]
    fn rejects_malformed_filters() {
        let config = LoggingConfig {
            filter: Some("scope_auth=loud".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            create_env_filter(&config),
            Err(LoggingError::InvalidFilter(..))
        ));
    }
}
