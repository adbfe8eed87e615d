//! Fakes for exercising the gateway without AWS or BigQuery.
//!
//! - [`secrets`] scripts secret store responses and serves static credentials.
//! - [`warehouse`] is an in-memory warehouse that records connects, closes and submitted SQL.

pub mod secrets;
pub mod warehouse;
