//! Core of the BigQuery gateway: credential retrieval, SQL validation, query execution and the
//! response envelope shared by every tool operation.

pub mod clients;
pub mod envelope;
pub mod error;
mod macros;
pub mod operations;
pub mod retry;
pub mod secrets;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod validation;
