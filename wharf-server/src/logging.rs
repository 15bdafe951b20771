//! Logging utilities for the Wharf server
//!
//! This module provides structured logging for the engine plus the optional
//! per-server log sink, a single application callback that receives every
//! engine diagnostic line together with its severity.

use std::fmt;
use std::sync::Arc;

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::error!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[ERROR] {}", format!($($arg)*));
        }
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::warn!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[WARN] {}", format!($($arg)*));
        }
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::info!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[INFO] {}", format!($($arg)*));
        }
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::debug!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[DEBUG] {}", format!($($arg)*));
        }
    };
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        {
            tracing::trace!($($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!("[TRACE] {}", format!($($arg)*));
        }
    };
}

/// Initialize logging subsystem
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Initialize logging subsystem (no-op when logging feature is disabled)
#[cfg(not(feature = "logging"))]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    Ok(())
}

/// Severity of a diagnostic line handed to a [`LogSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Unrecoverable per-connection or listener failure
    Error,
    /// Unexpected but handled condition
    Warn,
    /// Lifecycle milestone
    Info,
    /// Per-connection detail
    Debug,
    /// Per-message detail
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Trace => write!(f, "TRACE"),
        }
    }
}

/// Application-supplied callback receiving engine diagnostics
///
/// When configured, every diagnostic line the engine produces is also handed
/// to this callback with its severity. The callback runs inline on engine
/// tasks and must not block.
#[derive(Clone)]
pub struct LogSink {
    callback: Arc<dyn Fn(LogLevel, &str) + Send + Sync>,
}

impl LogSink {
    /// Wrap a callback as a log sink
    pub fn new(callback: impl Fn(LogLevel, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Hand one diagnostic line to the callback
    pub fn emit(&self, level: LogLevel, message: &str) {
        (self.callback)(level, message);
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("callback", &"<fn>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_logging_macros() {
        log_info!("Test info message");
        log_warn!("Test warning message");
        log_error!("Test error message");
        log_debug!("Test debug message");
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Error.to_string(), "ERROR");
        assert_eq!(LogLevel::Trace.to_string(), "TRACE");
    }

    #[test]
    fn test_log_sink_receives_lines() {
        let lines: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink = LogSink::new(move |level, message| {
            captured.lock().unwrap().push((level, message.to_string()));
        });

        sink.emit(LogLevel::Info, "listener started");
        sink.emit(LogLevel::Warn, "peer rejected");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LogLevel::Info, "listener started".to_string()));
        assert_eq!(lines[1].0, LogLevel::Warn);
    }
}
