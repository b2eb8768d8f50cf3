//! HTTP adapter for the Kiln asset pipeline.

pub mod middleware;
pub mod router;
