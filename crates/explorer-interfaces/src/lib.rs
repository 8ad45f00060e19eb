//! Explorer Interfaces
//!
//! This crate provides the access-port contract shared between the
//! metadata graph engine and the concrete backends (remote DHIS2-style
//! API, in-memory fixtures).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Metadata access-port interfaces
pub mod metadata;

/// Re-export key types for convenient usage
pub use metadata::{
    Field, FieldSelection, Id, MetadataError, MetadataFilter, MetadataItem, MetadataList,
    MetadataQuery, MetadataRepository, MetadataResult, Pager, ResourceType,
};
