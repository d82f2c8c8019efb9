//! Error types for the OGC proxy.

use thiserror::Error;

/// Result type alias using ProxyError.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Primary error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    // === OGC Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unsupported service: {0}")]
    UnsupportedService(String),

    #[error("Invalid XML request body: {0}")]
    InvalidXml(String),

    // === Cache Errors ===
    #[error("Cache provisioning failed: {0}")]
    CacheProvisioning(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Transport Errors ===
    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Upstream request timed out")]
    Timeout,

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ProxyError {
    /// Get the OGC exception code for this error.
    pub fn ogc_exception_code(&self) -> &'static str {
        match self {
            ProxyError::MissingParameter(_) => "MissingParameterValue",
            ProxyError::InvalidParameter { .. } => "InvalidParameterValue",
            ProxyError::UnsupportedService(_) => "InvalidParameterValue",
            ProxyError::InvalidXml(_) => "OperationParsingFailed",
            _ => "NoApplicableCode",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ProxyError::MissingParameter(_)
            | ProxyError::InvalidParameter { .. }
            | ProxyError::UnsupportedService(_)
            | ProxyError::InvalidXml(_) => 400,

            ProxyError::Transport(_) => 502,
            ProxyError::Timeout => 504,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::InternalError(format!("JSON error: {}", err))
    }
}
