//! Error types for query, flattening and projection.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The search endpoint answered with a non-success status.
    #[error("search request failed with status {status} for query `{query}`: {body}")]
    RequestFailed {
        query: String,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP status (connect, TLS, timeout).
    #[error("search request could not be sent for query `{query}`: {source}")]
    Transport {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    /// A field's runtime JSON shape has no matching coercion or parser.
    #[error("field `{field}` has an unsupported shape: {shape}")]
    UnsupportedShape { field: String, shape: String },

    /// Typed projection asked for a type the stored value cannot be cast to.
    #[error("field `{field}` expected {expected} but found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn unsupported(field: impl Into<String>, shape: impl Into<String>) -> Self {
        Error::UnsupportedShape {
            field: field.into(),
            shape: shape.into(),
        }
    }

    /// True for errors that abort a whole paginated query.
    pub fn is_fatal_for_query(&self) -> bool {
        matches!(
            self,
            Error::RequestFailed { .. } | Error::Transport { .. } | Error::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_message_carries_query_and_status() {
        let err = Error::RequestFailed {
            query: "project = X".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("project = X"));
        assert!(msg.contains("503"));
        assert!(err.is_fatal_for_query());
    }

    #[test]
    fn test_field_errors_are_not_query_fatal() {
        let err = Error::unsupported("Flag", "array");
        assert!(!err.is_fatal_for_query());
        assert_eq!(err.to_string(), "field `Flag` has an unsupported shape: array");
    }
}
