//! Warehouse client abstraction and its BigQuery implementation.

mod base;
pub mod bigquery;
mod encoding;

pub use base::{QueryOptions, QueryRows, WarehouseConnector, WarehouseError, WarehouseHandle};
pub use encoding::decode_row;
