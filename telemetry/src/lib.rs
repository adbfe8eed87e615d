//! Process-wide logging setup for the gateway binaries and their tests.

pub mod tracing;

pub use self::tracing::{LogFlusher, TracingError, init_test_tracing, init_tracing};
