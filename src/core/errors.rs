//! MDL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Top-level error type for the Modeler fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("[MDL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MDL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MDL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MDL-1101] invalid job: {details}")]
    InvalidJob { details: String },

    #[error("[MDL-2001] fixture missing: {path}")]
    FixtureMissing { path: PathBuf },

    #[error("[MDL-2002] destination locked at {path}: {source}")]
    DestinationLocked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MDL-2003] destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    #[error("[MDL-2004] directory not empty after delete: {path}")]
    DirectoryNotEmpty { path: PathBuf },

    #[error("[MDL-2101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MDL-3001] socket fault during {context}: {source}")]
    SocketFault {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[MDL-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MDL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FixtureError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MDL-1001",
            Self::MissingConfig { .. } => "MDL-1002",
            Self::ConfigParse { .. } => "MDL-1003",
            Self::InvalidJob { .. } => "MDL-1101",
            Self::FixtureMissing { .. } => "MDL-2001",
            Self::DestinationLocked { .. } => "MDL-2002",
            Self::DestinationExists { .. } => "MDL-2003",
            Self::DirectoryNotEmpty { .. } => "MDL-2004",
            Self::Io { .. } => "MDL-2101",
            Self::SocketFault { .. } => "MDL-3001",
            Self::Serialization { .. } => "MDL-3101",
            Self::Runtime { .. } => "MDL-3900",
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

    /// Convenience constructor for socket failures.
    #[must_use]
    pub fn socket(context: &'static str, source: std::io::Error) -> Self {
        Self::SocketFault { context, source }
    }
}

impl From<serde_json::Error> for FixtureError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FixtureError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
