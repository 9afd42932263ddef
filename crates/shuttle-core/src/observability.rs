//! Observability - tracing subscriber の初期化
//!
//! ライブラリ側はターゲット付きの `tracing` マクロを使うだけ
//! （`shuttle.worker`, `shuttle.runner`, `shuttle.controller`, `shuttle.watcher`,
//! `shuttle.listeners`, `shuttle.engine`）。subscriber のインストールは
//! バイナリ側が `logger_init` で行う。

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid logger format: {0} (expected: text|json)")]
    InvalidFormat(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("logger has already been initialized")]
    AlreadyInitialized,

    #[error("failed to initialize logger: {0}")]
    InitializationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    Text,
    Json,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directives, e.g. `info` or `info,shuttle.runner=debug`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: false,
        }
    }
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

/// Install the global subscriber. Fails if one is already set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInitialized);
    }

    let registry = tracing_subscriber::registry().with(filter);
    let result = match cfg.format {
        LoggerFormat::Text => registry
            .with(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_thread_names(true),
            )
            .try_init(),
        LoggerFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_thread_names(true),
            )
            .try_init(),
    };
    result.map_err(|e| LoggerError::InitializationFailed(e.to_string()))
}
