//! LB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LbError>;

/// Top-level error type for lazyblue.
#[derive(Debug, Error)]
pub enum LbError {
    #[error("[LB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[LB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[LB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[LB-1004] configuration serialization failure: {details}")]
    ConfigWrite { details: String },

    #[error("[LB-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[LB-2001] radio link failure for {address}: {details}")]
    Link { address: String, details: String },

    #[error("[LB-2002] signal strength query failed for {address}: {details}")]
    StrengthQuery { address: String, details: String },

    #[error("[LB-3001] failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[LB-3002] process protocol violation from `{command}`: {details}")]
    ProcessProtocol { command: String, details: String },

    #[error("[LB-3003] failed to signal pid {pid}: {details}")]
    Signal { pid: u32, details: String },

    #[error("[LB-3004] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[LB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl LbError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "LB-1001",
            Self::MissingConfig { .. } => "LB-1002",
            Self::ConfigParse { .. } => "LB-1003",
            Self::ConfigWrite { .. } => "LB-1004",
            Self::UnsupportedPlatform { .. } => "LB-1101",
            Self::Link { .. } => "LB-2001",
            Self::StrengthQuery { .. } => "LB-2002",
            Self::Spawn { .. } => "LB-3001",
            Self::ProcessProtocol { .. } => "LB-3002",
            Self::Signal { .. } => "LB-3003",
            Self::Io { .. } => "LB-3004",
            Self::Runtime { .. } => "LB-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for spawn failures.
    #[must_use]
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for LbError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for LbError {
    fn from(value: toml::ser::Error) -> Self {
        Self::ConfigWrite {
            details: value.to_string(),
        }
    }
}
