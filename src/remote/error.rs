//! Structured failures from the CRM client.
//!
//! The controller shows a fixed message per action; these carry the detail
//! that goes to the log instead.

use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error: {} {reason} (request {correlation_id})", .status.as_u16())]
    Status {
        status: StatusCode,
        reason: String,
        correlation_id: Uuid,
    },

    #[error("request {correlation_id} failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
        correlation_id: Uuid,
    },

    #[error("failed to decode response for request {correlation_id}: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        correlation_id: Uuid,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid request: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid header override `{0}`")]
    InvalidHeader(String),
}

impl ApiError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Status { .. } => "status",
            ApiError::Transport { .. } => "transport",
            ApiError::Decode { .. } => "decode",
            ApiError::Encode(_) => "encode",
            ApiError::Build(_) => "build",
            ApiError::InvalidHeader(_) => "header",
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            ApiError::Status { correlation_id, .. }
            | ApiError::Transport { correlation_id, .. }
            | ApiError::Decode { correlation_id, .. } => Some(*correlation_id),
            ApiError::Encode(_) | ApiError::Build(_) | ApiError::InvalidHeader(_) => None,
        }
    }

    pub(crate) fn from_status(status: StatusCode, correlation_id: Uuid) -> Self {
        ApiError::Status {
            status,
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_code_reason_and_correlation() {
        let id = Uuid::new_v4();
        let err = ApiError::from_status(StatusCode::NOT_FOUND, id);

        assert_eq!(err.kind(), "status");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.correlation_id(), Some(id));
        assert_eq!(err.to_string(), format!("API error: 404 Not Found (request {id})"));
    }

    #[test]
    fn encode_errors_have_no_correlation() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = ApiError::Encode(source);
        assert_eq!(err.kind(), "encode");
        assert!(err.status().is_none());
        assert!(err.correlation_id().is_none());
    }
}
