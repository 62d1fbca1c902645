//! Test fixtures for E2E tests
//!
//! Provides reusable task executors and services for testing.


#[allow(unused_imports)]
pub use tasks::*;
