//! Errors produced while building or using a [`CortexClient`](super::CortexClient).

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Cortex client and its transports.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured address is not an absolute http(s) URL.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The tenant ID cannot be sent as an HTTP header value.
    #[error("invalid tenant ID {0:?}: not a valid header value")]
    InvalidTenant(String),

    /// The request could not be sent or the response body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered 404 for the requested path.
    #[error("requested resource not found: {path}")]
    NotFound {
        /// The request path.
        path: String,
    },

    /// The backend answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: StatusCode,
        /// The response body, lossily decoded.
        body: String,
    },

    /// A request or response body was not valid YAML for the expected type.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ClientError {
    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::InvalidAddress {
            address: "cortex:9009".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid address \"cortex:9009\": relative URL without a base"
        );

        let err = ClientError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "bad rule".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status 400 Bad Request: bad rule");
    }

    #[test]
    fn test_is_not_found() {
        let err = ClientError::NotFound {
            path: "/api/v1/rules/ns".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!ClientError::InvalidTenant("a\nb".to_string()).is_not_found());
    }
}
