//! Application-wide error types.
//!
//! Subsystems with their own taxonomy define local enums via `thiserror`
//! ([`crate::event::EventError`], [`crate::audio::DecodeError`],
//! [`crate::audio::DeviceError`], [`crate::player::PlayerError`]); this
//! module provides the shared [`Error`] for the library and config layer.
//! `main` uses `anyhow` for final propagation.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error for the library/config layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Keyword search error
    #[error("Search error: {0}")]
    Search(#[from] crate::search::SearchError),

    /// Library scan/query error
    #[error("Library error: {0}")]
    Library(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a library error.
    pub fn library(message: impl Into<String>) -> Self {
        Self::Library(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::library("scan failed");
        assert!(err.to_string().contains("scan failed"));
    }

    #[test]
    fn test_search_error_converts() {
        let err: Error = crate::search::SearchError::EmptyPattern.into();
        assert!(err.to_string().contains("Search error"));
    }
}
