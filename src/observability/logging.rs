//! Structured logging.
//!
//! Level comes from `SERVER_LOG_LEVEL` unless `RUST_LOG` is set; format from
//! `SERVER_LOG_FORMAT` (`json` or `text`).

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::schema::{SERVER_LOG_FORMAT, SERVER_LOG_LEVEL};
use crate::config::ConfigStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Unknown spellings fall back to JSON.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "console" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(store: &ConfigStore) -> Result<(), TryInitError> {
    let level = store.get_string(SERVER_LOG_LEVEL);
    let level = if level.is_empty() { "info".to_string() } else { level };
    let format = LogFormat::parse(&store.get_string(SERVER_LOG_FORMAT));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},tower_http={level},hyper=warn,reqwest=warn"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with((format == LogFormat::Json).then(|| fmt::layer().json()))
        .with((format == LogFormat::Text).then(fmt::layer))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" Text "), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Json);
    }
}
