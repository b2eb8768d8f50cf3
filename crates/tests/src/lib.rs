//! Integration tests for the Kiln asset pipeline.
//!
//! - `pipeline_tests`: Request flow through model, cache and processor chain, including the
//!   error policies and model reload behavior
//! - `concurrency_tests`: Single-flight coalescing and cross-key independence under load
//! - `scheduler_tests`: Timer-driven invalidation against a paused clock
//! - `runtime_tests`: Builder, preload and shutdown of a file-backed runtime
//! - `mock_infrastructure`: Counting loader, reader and event sink plus a wired harness
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod runtime_tests;

pub mod mock_infrastructure;
