//! Error types for the monitoring core

use std::fmt;

/// Result type alias for monitoring operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while configuring or driving the monitor
#[derive(Debug)]
pub enum MonitorError {
    /// Configuration rejected at startup
    InvalidConfig(String),

    /// Measurement that is non-finite, out of domain or of the wrong kind
    InvalidMeasurement(String),

    /// Operation on a pair the state store does not know about
    UnknownPair(String),

    /// A pair was dispatched while it already had a probe in flight
    AlreadyInFlight(String),

    /// Configuration parsing error
    Serialization(String),

    /// An actor channel was closed
    ChannelClosed(String),

    /// I/O error (config file access, etc.)
    Io(std::io::Error),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            MonitorError::InvalidMeasurement(msg) => write!(f, "invalid measurement: {}", msg),
            MonitorError::UnknownPair(pair) => write!(f, "unknown pair: {}", pair),
            MonitorError::AlreadyInFlight(pair) => {
                write!(f, "pair already has a probe in flight: {}", pair)
            }
            MonitorError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            MonitorError::ChannelClosed(msg) => write!(f, "channel closed: {}", msg),
            MonitorError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}
