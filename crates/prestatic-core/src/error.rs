//! Errors raised while loading configuration and entry files.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ScopeKind;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types for prestatic.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The configuration file is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A collection or singleton definition is invalid.
    #[error("{kind} `{name}`: {message}")]
    Scope {
        kind: ScopeKind,
        name: String,
        message: String,
    },

    /// An entry's frontmatter block could not be parsed.
    #[error("Frontmatter error in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The environment override layer could not be read.
    #[error("Environment override error: {0}")]
    Env(#[from] config::ConfigError),
}

impl CoreError {
    /// Configuration error without an underlying cause.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Configuration error wrapping the parser failure that caused it.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn scope(kind: ScopeKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scope {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }
}
