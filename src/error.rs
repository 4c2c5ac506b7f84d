//! Error types for the render pipeline and the HTTP layer

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Body sent for every 5xx response. Internal detail stays in the logs.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Failures of the TeX -> SVG step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesetError {
    /// The engine itself failed (startup or evaluation)
    #[error("TeX engine error: {0}")]
    Engine(String),

    /// The engine produced an error node for the input (bad TeX, unknown macro)
    #[error("TeX input rejected: {0}")]
    Rejected(String),

    /// The engine returned nothing usable
    #[error("TeX engine produced no SVG output")]
    EmptyOutput,
}

/// Failures of the SVG -> PNG step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    /// The SVG markup could not be parsed
    #[error("Failed to parse SVG: {0}")]
    Parse(String),

    /// The SVG has no positive, finite size
    #[error("SVG has no usable size ({width}x{height})")]
    InvalidDimensions { width: f32, height: f32 },

    /// The scaled output would exceed the configured limit
    #[error("Output of {width}x{height} exceeds the {max}px limit")]
    TooLarge { width: u64, height: u64, max: u32 },

    /// The scaled output would exceed the configured pixel budget
    #[error("Output of {width}x{height} exceeds the {max} pixel budget")]
    TooManyPixels { width: u32, height: u32, max: u64 },

    /// The pixel buffer could not be allocated
    #[error("Failed to allocate a {width}x{height} canvas")]
    Allocation { width: u32, height: u32 },

    /// PNG encoding failed
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
}

/// Errors surfaced by the service
#[derive(Error, Debug)]
pub enum Error {
    /// The request was malformed; the message is safe to show the caller
    #[error("{0}")]
    InvalidInput(String),

    /// Typesetting failed
    #[error("Rendering failed: {0}")]
    Typeset(#[from] TypesetError),

    /// Rasterization failed
    #[error("Conversion failed: {0}")]
    Raster(#[from] RasterError),

    /// Render did not finish in time
    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    /// The HTTP listener could not be set up
    #[error("Server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status code reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            _ => 500,
        }
    }

    /// Response body reported to the caller
    pub fn public_message(&self) -> &str {
        match self {
            Error::InvalidInput(msg) => msg,
            _ => INTERNAL_ERROR_BODY,
        }
    }
}
