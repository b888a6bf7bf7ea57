//! Testing utilities
//!
//! Mock agents that let the executor be exercised without real pipeline
//! stages behind it.

pub mod mocks;

pub use mocks::*;
