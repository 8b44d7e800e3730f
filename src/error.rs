//! Error types for nft-blackhole.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlackholeError {
    /// Malformed or missing policy field. Raised before nft is touched.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single source could not be retrieved. Never escapes the fetcher.
    #[error("Failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    /// nft rejected a document or set population.
    #[error("nft rejected {what}: {reason}")]
    Apply { what: String, reason: String },

    /// nft could not delete the table or flush a set.
    #[error("nft could not {what}: {reason}")]
    DeleteOrFlush { what: String, reason: String },
}

impl BlackholeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the errors that must abort the current action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Apply { .. })
    }
}

pub type Result<T> = std::result::Result<T, BlackholeError>;
