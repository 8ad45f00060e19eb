//! Graph data model and per-build accumulator.

mod builder;
mod model;

pub(crate) use builder::GraphBuilder;
pub use model::{
    graph_node_key, EdgeLabel, GraphEdge, GraphGroup, GraphNode, GroupDirection,
    LazyCategoryOptionCombos, LazyRelations, MetadataGraph, OPTION_COMBO_GROUP_ID,
};
