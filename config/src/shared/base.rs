use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required setting is absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// A setting has a value outside of its allowed range.
    #[error("{field} {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: String,
    },
}
