//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every session failure mode.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Engine binary preparation, spawn, or pipe capture failed.
    Setup(String),
    /// A final-result record could not be decoded.
    Decode(String),
    /// Unexpected failure reading one of the engine streams.
    Io(String),
    /// The engine process exited abnormally.
    Exit(String),
    /// Writing an inbound message to the engine failed.
    Write(String),
    /// The session is no longer accepting inbound messages.
    SessionClosed(String),
    /// The caller cancelled the session.
    Cancelled(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Setup(msg) => write!(f, "setup: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Exit(msg) => write!(f, "exit: {msg}"),
            Self::Write(msg) => write!(f, "write: {msg}"),
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(format!("malformed result record: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
