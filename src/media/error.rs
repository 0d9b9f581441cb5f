//! Error types for media host uploads

use thiserror::Error;

/// Result type for media host operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while handing an image to the media host
#[derive(Error, Debug)]
pub enum MediaError {
    /// The media host answered with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The success response lacked a field we depend on
    #[error("response is missing `{0}`")]
    MissingField(&'static str),

    /// The success response was not the JSON we expected
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// Connection failure, timeout or body read error
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
