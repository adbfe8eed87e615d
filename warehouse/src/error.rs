//! Error types and result definitions for gateway operations.
//!
//! Every core operation returns [`GatewayResult`]. A [`GatewayError`] carries an [`ErrorKind`]
//! used by callers to pick a response code, a static description, an optional dynamic detail
//! and the call-site location where it was created.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for gateway operations using [`GatewayError`] as the error type.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Categories of failures surfaced by the gateway.
///
/// All of them share [`GatewayError`] as their common base so the operation layer can handle
/// any failure uniformly while still branching on the kind where the response differs.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum ErrorKind {
    /// Required configuration is missing or invalid.
    Configuration,
    /// The secret store could not return a usable credential payload.
    CredentialRetrieval,
    /// Loading fresh credentials or building a client from them failed.
    CredentialRefresh,
    /// The requested table does not exist.
    TableNotFound,
    /// The caller supplied SQL or limits that are not accepted.
    QueryValidation,
    /// A warehouse call failed, or the client is not available.
    QueryExecution,
}

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for gateway operations.
///
/// The rendered message never contains credential material: descriptions are static and
/// details are only ever built from identifiers, error codes and remote error messages.
#[derive(Debug, Clone)]
pub struct GatewayError {
    payload: Box<ErrorPayload>,
}

impl GatewayError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        GatewayError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
            }),
        }
    }
}

impl PartialEq for GatewayError {
    fn eq(&self, other: &GatewayError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload.detail.as_deref() {
            Some(detail) if !detail.trim().is_empty() => {
                write!(f, "{}: {}", self.payload.description, detail)
            }
            _ => f.write_str(&self.payload.description),
        }
    }
}

impl error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`GatewayError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for GatewayError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> GatewayError {
        GatewayError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`GatewayError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for GatewayError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> GatewayError {
        GatewayError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}
