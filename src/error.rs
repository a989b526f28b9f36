//! Error types for the renderer

use thiserror::Error;

/// Result type alias for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a template to an image
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or connect to the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the rendered HTML into a page
    #[error("Failed to load page: {0}")]
    LoadError(String),

    /// Failed to measure or capture content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to read or substitute a template
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Invalid configuration or job data
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::TemplateError(err.to_string())
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Other(format!("File watch failed: {}", err))
    }
}
