//! Test doubles shared by unit and integration tests.

mod memory;

pub use memory::{InMemoryMetadataRepository, RecordedCall};
