//! Uniform success and error envelopes returned by the tool operations.

use std::borrow::Cow;

use serde::Serialize;
use uuid::Uuid;

/// Stable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TableNotFound,
    SchemaError,
    InvalidSql,
    QueryFailure,
}

/// Error part of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of one tool invocation.
///
/// Serializes to `{request_id, data}` or `{request_id, error}`, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success { request_id: String, data: T },
    Error { request_id: String, error: ErrorBody },
}

impl<T> Envelope<T> {
    pub fn success(request_id: String, data: T) -> Self {
        Envelope::Success { request_id, data }
    }

    /// Builds an error envelope. An empty or blank `detail` is dropped.
    pub fn error(
        request_id: String,
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        detail: Option<String>,
    ) -> Self {
        Envelope::Error {
            request_id,
            error: ErrorBody {
                code,
                message: message.into(),
                detail: detail.filter(|detail| !detail.trim().is_empty()),
            },
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Envelope::Success { request_id, .. } | Envelope::Error { request_id, .. } => request_id,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Envelope::Success { data, .. } => Some(data),
            Envelope::Error { .. } => None,
        }
    }

    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Error { error, .. } => Some(error),
        }
    }
}

/// Returns a fresh correlation id for one invocation.
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}
