//! Error taxonomy for the sorter core.
//!
//! Startup failures (`Config`, `Connection::Handshake`, `Connection::Open`) are
//! fatal. Everything raised while the control loop is running is recoverable;
//! the controller matches on the kind to decide whether the frame source must be
//! re-acquired.

use thiserror::Error;

pub type Result<T, E = SorterError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SorterError {
    #[error("mcu connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("detector error: {0}")]
    Detector(String),
}

impl SorterError {
    /// True when the frame source must be re-acquired before resuming.
    pub fn is_camera(&self) -> bool {
        matches!(self, SorterError::Camera(_))
    }

    /// Errors that abort startup instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SorterError::Config(_)
                | SorterError::Connection(ConnectionError::Handshake(_))
                | SorterError::Connection(ConnectionError::Open { .. })
        )
    }

    /// Malformed or unexpected replies to a single query. The IR poll retries
    /// these on the next frame instead of escalating.
    pub fn is_reply_format(&self) -> bool {
        matches!(
            self,
            SorterError::Protocol(_)
                | SorterError::Connection(ConnectionError::UnexpectedResponse { .. })
        )
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("the connection is not open")]
    NotOpen,
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("unexpected response to '{command}': {response}")]
    UnexpectedResponse { command: String, response: String },
    #[error("mcu rejected '{command}'")]
    Rejected { command: String },
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("serial i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown response '{0}'")]
    UnknownResponse(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("frame is missing the separator")]
    Unframed,
    #[error("frame exceeds {0} bytes without a separator")]
    FrameTooLong(usize),
    #[error("{kind} {value} is out of range")]
    InvalidIndex { kind: &'static str, value: u8 },
    #[error("frame is not valid ascii")]
    NonUtf8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key '{key}' on line {line}")]
    UnknownKey { line: usize, key: String },
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("line {line} is not a key=value pair")]
    Syntax { line: usize },
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
