//! MongoDB backend
//!
//! Forwards queries and aggregation pipelines to a MongoDB deployment via
//! the official driver.

mod connection;

pub use connection::{MongoDBBackend, MongoDBBackendBuilder};
