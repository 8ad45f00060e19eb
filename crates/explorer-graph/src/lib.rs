//! Graph assembly engine for a DHIS2-style metadata explorer.
//!
//! Given a center resource type and id, the engine fetches the entity
//! and its neighbors through the metadata access port (direct
//! relations, reverse lookups and multi-hop fan-outs), deduplicates
//! them and assembles a directed, labeled, grouped graph suitable for
//! rendering. A narrow pager lazily extends a built graph with
//! category option combos.

// Core modules
pub mod graph;
pub mod pipeline;
pub mod services;

// Implementation adapters (optional, can be provided externally)
#[cfg(feature = "adapters")]
pub mod adapters;

// Testing utilities - fixture-driven in-memory repository
pub mod test_utils;

// Re-export the port contract for convenient usage
pub use explorer_interfaces::metadata::{
    Field, FieldSelection, Id, MetadataError, MetadataFilter, MetadataItem, MetadataList,
    MetadataQuery, MetadataRepository, MetadataResult, Pager, ResourceType,
};

// Re-export key graph types
pub use graph::{
    graph_node_key, EdgeLabel, GraphEdge, GraphGroup, GraphNode, GroupDirection, LazyRelations,
    MetadataGraph,
};

// Re-export core services
pub use services::{
    CategoryOptionComboPager, ListMetadataService, MetadataGraphService, OptionComboPageRequest,
};

/// Initialize tracing for the explorer engine
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();
}
