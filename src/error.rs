//! Error taxonomy shared by every pipeline stage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a conversion.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown profile '{requested}' (known profiles: {})", known_list(.known))]
    UnknownProfile {
        requested: String,
        known: Vec<String>,
    },

    #[error("malformed front matter: {reason}")]
    MalformedFrontMatter { reason: String },

    #[error("template '{name}' not found at {}", .path.display())]
    TemplateNotFound { name: String, path: PathBuf },

    #[error("asset '{key}' not found at {}", .path.display())]
    AssetMissing { key: String, path: PathBuf },

    #[error("render backend '{backend}' unavailable: {reason}")]
    RenderBackendUnavailable { backend: String, reason: String },

    #[error("render backend '{backend}' failed: {reason}")]
    RenderFailed { backend: String, reason: String },

    #[error("failed to {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("input file {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("output directory {}: {reason}", .path.display())]
    InvalidOutputDir { path: PathBuf, reason: String },

    #[error("template placeholder '${{{name}}}' has no value")]
    UnresolvedPlaceholder { name: String },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the action and path it concerns.
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Stable class name, printed by the CLI alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownProfile { .. } => "UnknownProfile",
            Error::MalformedFrontMatter { .. } => "MalformedFrontMatter",
            Error::TemplateNotFound { .. } => "TemplateNotFound",
            Error::AssetMissing { .. } => "AssetMissing",
            Error::RenderBackendUnavailable { .. } => "RenderBackendUnavailable",
            Error::RenderFailed { .. } => "RenderFailed",
            Error::Filesystem { .. } => "FilesystemError",
            Error::Config { .. } => "ConfigError",
            Error::InvalidInput { .. } => "InvalidInput",
            Error::InvalidOutputDir { .. } => "InvalidOutputDir",
            Error::UnresolvedPlaceholder { .. } => "UnresolvedPlaceholder",
            Error::Serialize { .. } => "SerializeError",
        }
    }

    /// True for errors raised before any artifact is written.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::UnknownProfile { .. }
                | Error::Config { .. }
                | Error::InvalidInput { .. }
                | Error::InvalidOutputDir { .. }
                | Error::RenderBackendUnavailable { .. }
                | Error::MalformedFrontMatter { .. }
        )
    }
}

fn known_list(known: &[String]) -> String {
    if known.is_empty() {
        "none".to_string()
    } else {
        known.join(", ")
    }
}
