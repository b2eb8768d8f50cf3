//! Mock infrastructure for testing the Kiln pipeline.
//!
//! Every collaborator the pipeline talks to has a scripted stand-in that counts how it was
//! used, so tests can assert on the number of loads, reads and emitted events.
//!
//! ## Components
//!
//! - `MockModelLoader`: swappable model, failure toggle, optional load delay
//! - `MockResourceReader`: in-memory resources with per-URI read counts and read gates
//! - `RecordingSink`: counts every `CacheEvent` by variant
//! - `Harness`: a `RequestManager` wired to the mocks above
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{Harness, HarnessOptions, MockResourceReader};
//!
//! let reader = MockResourceReader::new().with("a.css", "a{}");
//! let harness = Harness::new(model, reader, HarnessOptions::default());
//! harness.manager.process(&GroupRequest::new("g1", None, false)).await?;
//! assert_eq!(harness.reader.read_count("a.css"), 1);
//! ```

pub mod test_helpers;

pub use mocks::{EventCounts, MockModelLoader, MockResourceReader, ReadGate, RecordingSink};
pub use test_helpers::*;
