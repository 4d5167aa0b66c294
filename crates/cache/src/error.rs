//! Error types for the cache engine

use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// A failure reported by a snapshot fetcher.
///
/// Fetchers wrap whatever transport they use (process invocation, HTTP);
/// this type carries the message and the underlying cause across the
/// engine boundary without the engine depending on any transport crate.
#[derive(Debug)]
pub struct FetchError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    /// Create a fetch error from a plain message.
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fetch error wrapping an underlying transport error.
    #[must_use]
    pub fn with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The snapshot fetch failed before reconciliation started.
    ///
    /// The store is left in its last-known-good state.
    #[error("snapshot fetch failed: {source}")]
    #[diagnostic(
        code(forgeview::cache::fetch_failed),
        help("Check the external source (repository, server connection) and retry the refresh")
    )]
    FetchFailed {
        /// The transport-level failure reported by the fetcher
        #[source]
        source: FetchError,
    },

    /// An operation was attempted against an entity that has been
    /// removed from its owning store.
    #[error("entity '{key}' has been deleted")]
    #[diagnostic(
        code(forgeview::cache::invalid_state),
        help("Deleted entities are never resurrected; look the key up again after the next refresh")
    )]
    InvalidState {
        /// Key of the deleted entity
        key: String,
    },

    /// Indexed lookup missed.
    #[error("no entity with key '{key}'")]
    #[diagnostic(
        code(forgeview::cache::key_not_found),
        help("Use try_get for a non-failing lookup")
    )]
    KeyNotFound {
        /// The key that was looked up
        key: String,
    },

    /// An async refresh was cancelled before its fetch completed.
    ///
    /// No reconciliation was applied.
    #[error("refresh cancelled")]
    #[diagnostic(code(forgeview::cache::cancelled))]
    Cancelled,
}

impl Error {
    /// Create a fetch failure error
    #[must_use]
    pub fn fetch_failed(source: FetchError) -> Self {
        Self::FetchFailed { source }
    }

    /// Create an invalid-state error for a deleted entity
    #[must_use]
    pub fn invalid_state(key: impl fmt::Display) -> Self {
        Self::InvalidState {
            key: key.to_string(),
        }
    }

    /// Create a key-not-found error
    #[must_use]
    pub fn key_not_found(key: impl fmt::Display) -> Self {
        Self::KeyNotFound {
            key: key.to_string(),
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
