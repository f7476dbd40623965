//! # docrail-test
//!
//! Testing utilities for docrail.
//!
//! - [`fixtures`]: rstest fixtures for in-memory backends with seeded data and,
//!   with the `testcontainers` feature, a MongoDB container
//! - [`logging`]: one-time test subscriber setup and a capture layer for
//!   asserting on emitted events

pub mod fixtures;
pub mod logging;

pub use logging::{CapturedEvent, LogCapture, init_test_logging};
