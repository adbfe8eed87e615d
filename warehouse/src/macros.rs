//! Shorthands for building [`crate::error::GatewayError`] values.

/// Builds a [`crate::error::GatewayError`] of the given [`crate::error::ErrorKind`].
///
/// `detail = expr` moves an owned [`String`] into the error, a bare third argument is
/// formatted with `to_string`. `source: expr` attaches the underlying error.
#[macro_export]
macro_rules! gateway_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::GatewayError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::GatewayError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::GatewayError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::GatewayError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::GatewayError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::GatewayError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with a [`crate::error::GatewayError`] built by [`gateway_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::gateway_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::gateway_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::gateway_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
