//! End-to-end test support for kotoba
//!
//! Shared harness (isolated temp databases) and fixtures (realistic
//! dictionary records) used by the journey tests.

pub mod fixtures;
pub mod harness;
