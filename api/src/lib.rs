//! HTTP surface of the BigQuery gateway: tool routes, health probe and server startup.

pub mod request_logging;
pub mod routes;
pub mod startup;
pub mod state;
