//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Workspace provisioning failure (template missing, copy failure).
    Provision(String),
    /// Session launch failure (spawn rejected, port occupied, not ready).
    Launch(String),
    /// Session table or ownership ledger cannot be created or written.
    Registry(String),
    /// A single process could not be terminated.
    Termination(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error aborts the whole run rather than a single user.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Registry(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Provision(msg) => write!(f, "provision: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Termination(msg) => write!(f, "termination: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        Self::Registry(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Registry(format!("ownership record: {err}"))
    }
}
