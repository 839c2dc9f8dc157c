//! Error types shared across the editor.

use thiserror::Error;

/// Errors raised when constructing or editing a bounding box.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoxError {
    /// Box is narrower or shorter than the minimum size
    #[error("Box too small: {width:.1}x{height:.1} (minimum {min})")]
    TooSmall {
        /// Requested width in image pixels
        width: f32,
        /// Requested height in image pixels
        height: f32,
        /// Minimum allowed side length
        min: f32,
    },

    /// A coordinate was NaN or infinite
    #[error("Invalid coordinates: {message}")]
    InvalidCoordinates {
        /// Description of the problem
        message: String,
    },
}

impl BoxError {
    /// Create a too-small error.
    pub fn too_small(width: f32, height: f32, min: f32) -> Self {
        Self::TooSmall { width, height, min }
    }

    /// Create an invalid coordinates error.
    pub fn invalid_coordinates(message: impl Into<String>) -> Self {
        Self::InvalidCoordinates {
            message: message.into(),
        }
    }
}

/// Errors talking to the image and annotation store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport failure (connection refused, timeout, ...)
    #[error("Request failed: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body or reason phrase returned by the server
        message: String,
    },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Image bytes could not be decoded
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Requested item is unknown to the store
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
