//! Error types for the ledger gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {

    // =============================
    // Backend Errors
    // =============================

    /// The ERP endpoint could not be reached or answered with garbage.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected the configured credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend executed the call and reported a fault, or the single
    /// retry after reauthentication failed as well.
    #[error("Request failed: {0}")]
    Request(String),

    /// A referenced entity (account code, invoice id, ...) resolved to
    /// nothing on the backend.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A caller-imposed deadline expired before the backend answered.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // =============================
    // Dispatch Errors
    // =============================

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Stable machine-readable tag for each error kind, used by the API
    /// layer for status mapping and by logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Connection(_) => "connection",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::Request(_) => "request",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::InvalidInput(_) => "invalid_input",
            GatewayError::ToolNotFound(_) => "tool_not_found",
            GatewayError::Serialization(_) => "serialization",
            GatewayError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_kind_prefix() {
        let err = GatewayError::Authentication("bad password".into());
        assert_eq!(err.to_string(), "Authentication failed: bad password");
        assert_eq!(err.kind(), "authentication");
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: GatewayError = parse.into();
        assert_eq!(err.kind(), "serialization");
    }
}
