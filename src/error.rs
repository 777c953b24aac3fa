//! Error types for flag-relay.

use std::fmt;

/// Result type alias for flag-relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced by the tenant registry and settings loading.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No usable tenant could be built, or settings could not be loaded.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Settings were loaded but rejected by validation.
    #[error("Settings validation failed: {0}")]
    Validation(String),

    /// The presented API key does not map to any tenant.
    ///
    /// The key is never part of the message.
    #[error("Unknown API key")]
    UnknownKey,

    /// No tenant with the given name is registered.
    #[error("Unknown flagset: {0}")]
    UnknownTenant(String),

    /// The registry was closed.
    #[error("Tenant registry is closed")]
    Closed,

    /// A flag engine failed to build or load.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Failure to deliver a change set to one connection or one notifier backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The remote endpoint answered with a status outside `[200, 399]`.
    #[error("Endpoint answered with status {status}")]
    Status {
        /// HTTP status code returned by the endpoint
        status: u16,
    },

    /// The request never produced a response.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The send did not complete within its deadline.
    #[error("Delivery timed out")]
    Timeout,

    /// The payload could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    /// The connection is gone.
    #[error("Connection closed")]
    Disconnected,

    /// The notifier task panicked.
    #[error("Notifier panicked: {0}")]
    Panicked(String),
}

/// Failure to render a single flag into a chat entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The flag definition nests deeper than the diff walker allows.
    #[error("Flag '{flag}' nests deeper than {limit} levels")]
    TooDeep {
        /// Name of the flag that failed to render
        flag: String,
        /// Depth limit that was exceeded
        limit: usize,
    },
}

/// Validation error for relay settings.
#[derive(Debug)]
pub enum ValidationError {
    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when single.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for RelayError {
    fn from(err: ValidationError) -> Self {
        RelayError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_message_hides_key() {
        assert_eq!(RelayError::UnknownKey.to_string(), "Unknown API key");
    }

    #[test]
    fn test_validation_from_list() {
        assert!(ValidationError::from_list(vec![]).is_none());

        let single =
            ValidationError::from_list(vec![ValidationError::invalid_field("url", "not http")]).unwrap();
        assert_eq!(single.to_string(), "Field 'url' is invalid: not http");

        let multiple = ValidationError::from_list(vec![
            ValidationError::invalid_field("poll_interval_ms", "too small"),
            ValidationError::invalid_field("url", "not http"),
        ])
        .unwrap();
        let text = multiple.to_string();
        assert!(text.contains("1. Field 'poll_interval_ms' is invalid: too small"));
        assert!(text.contains("2. Field 'url' is invalid: not http"));
    }

    #[test]
    fn test_validation_converts_to_relay_error() {
        let err: RelayError = ValidationError::invalid_field("poll_interval_ms", "too small").into();
        assert!(matches!(err, RelayError::Validation(_)));
    }
}
