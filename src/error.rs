//! Host-facing error type.

use thiserror::Error;

use crate::client::ClientError;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A resource configuration is invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is not configured, or its configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The host sent a malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A JSON payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A YAML document could not be encoded or decoded.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A call to the Cortex API failed.
    #[error("Cortex API error: {0}")]
    Client(#[from] ClientError),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::InvalidRequest(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Yaml(err) => err.to_string(),
            Self::Client(err) => err.to_string(),
            Self::Transport(err) => err.to_string(),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Yaml(err) => {
                tonic::Status::invalid_argument(format!("YAML error: {}", err))
            },
            ProviderError::Client(err) => client_status(err),
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
        }
    }
}

fn client_status(err: ClientError) -> tonic::Status {
    let message = err.to_string();
    match err {
        ClientError::InvalidAddress { .. } | ClientError::InvalidTenant(_) => {
            tonic::Status::failed_precondition(message)
        },
        ClientError::NotFound { .. } => tonic::Status::not_found(message),
        ClientError::Status { status, .. } => match status.as_u16() {
            400 | 422 => tonic::Status::invalid_argument(message),
            401 => tonic::Status::unauthenticated(message),
            403 => tonic::Status::permission_denied(message),
            409 => tonic::Status::already_exists(message),
            429 => tonic::Status::resource_exhausted(message),
            _ => tonic::Status::unavailable(message),
        },
        ClientError::Http(_) => tonic::Status::unavailable(message),
        ClientError::Yaml(_) => tonic::Status::internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("team-a/ns".to_string());
        assert_eq!(format!("{}", err), "Resource not found: team-a/ns");

        let err = ProviderError::Validation("content has no groups".to_string());
        assert_eq!(format!("{}", err), "Validation error: content has no groups");

        let err = ProviderError::UnknownResource("cortex_dashboard".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: cortex_dashboard");
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::NotFound("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ProviderError::Validation("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Configuration("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::InvalidRequest("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_client_error_to_status() {
        let status = |err: ClientError| tonic::Status::from(ProviderError::from(err)).code();

        assert_eq!(
            status(ClientError::Status {
                status: StatusCode::UNAUTHORIZED,
                body: String::new(),
            }),
            tonic::Code::Unauthenticated
        );
        assert_eq!(
            status(ClientError::Status {
                status: StatusCode::BAD_REQUEST,
                body: "bad rule".to_string(),
            }),
            tonic::Code::InvalidArgument
        );
        assert_eq!(
            status(ClientError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: String::new(),
            }),
            tonic::Code::Unavailable
        );
        assert_eq!(
            status(ClientError::NotFound {
                path: "/api/v1/alerts".to_string(),
            }),
            tonic::Code::NotFound
        );
        assert_eq!(
            status(ClientError::InvalidTenant("a\nb".to_string())),
            tonic::Code::FailedPrecondition
        );
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::NotFound("team-a/ns".to_string());
        assert_eq!(err.message(), "team-a/ns");

        let err = ProviderError::Configuration("provider is not configured".to_string());
        assert_eq!(err.message(), "provider is not configured");

        let err = ProviderError::from(ClientError::InvalidTenant("a\nb".to_string()));
        assert!(err.message().contains("tenant"));
    }
}
