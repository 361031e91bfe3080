//! Logging setup.
//!
//! Two sinks, each with its own level:
//! - the terminal, filtered by `RUST_LOG` when set, else by the configured level
//! - an optional log file, without ANSI colours

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Verbosity of a logging sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Install the global subscriber
///
/// Fails if the log file cannot be created or a subscriber is already set.
pub fn init(term_level: LogLevel, file_level: LogLevel, log_file: Option<&Path>) -> Result<()> {
    let term_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(term_level.as_str()));
    let term_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(term_filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::from(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(term_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the logging subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_yaml() {
        let level: LogLevel = serde_yaml::from_str("warn").unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(LevelFilter::from(level), LevelFilter::WARN);
        assert!(serde_yaml::from_str::<LogLevel>("loud").is_err());
    }
}
