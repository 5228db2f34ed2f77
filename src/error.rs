use crate::transport::ApiError;
use crate::types::Operation;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Validation(String),
    #[error("Session changed while the request was in flight")]
    SessionChanged,
}

/// Failed session operation, as reported to the caller.
///
/// `message` is the identity service's own `error` text when it sent one,
/// otherwise the fixed fallback for [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
#[non_exhaustive]
pub struct OperationFailure {
    pub operation: Operation,
    pub message: String,
}

impl OperationFailure {
    /// Build the caller-facing failure for `operation` from an underlying error.
    #[must_use]
    pub fn from_error(operation: Operation, error: &Error) -> Self {
        let message = match error {
            Error::Api(api) => api.message().map(str::to_owned),
            _ => None,
        }
        .unwrap_or_else(|| operation.fallback_message().to_owned());

        Self { operation, message }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn service_message_passes_through() {
        let err = Error::Api(ApiError::new(Some(400), Some(json!({"error": "bad creds"}))));
        let failure = OperationFailure::from_error(Operation::Login, &err);
        assert_eq!(failure.message(), "bad creds");
        assert_eq!(failure.operation, Operation::Login);
    }

    #[test]
    fn missing_message_uses_fallback() {
        let err = Error::Api(ApiError::new(Some(500), Some(json!({"detail": "boom"}))));
        let failure = OperationFailure::from_error(Operation::Register, &err);
        assert_eq!(failure.message(), "Registration failed. Please try again.");
    }

    #[test]
    fn non_api_errors_use_fallback() {
        let err = Error::Store("disk full".into());
        let failure = OperationFailure::from_error(Operation::ChangePassword, &err);
        assert_eq!(failure.to_string(), "Password change failed. Please try again.");
    }
}
