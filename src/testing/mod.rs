//! Testing utilities and mock implementations
//!
//! Mock broker implementations for exercising the worker without a running
//! Redis instance.

pub mod mocks;

pub use mocks::*;
