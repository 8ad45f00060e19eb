//! Local mutable accumulator for one graph build. Scoped strictly to a
//! single build call; never shared across calls.

use std::collections::HashSet;

use explorer_interfaces::metadata::ResourceType;

use super::model::{
    graph_node_key, EdgeLabel, GraphEdge, GraphGroup, GraphNode, LazyRelations, MetadataGraph,
};

/// Accumulates deduplicated nodes (first-insertion order, first-write
/// wins) and appended edges, then assembles the final graph with empty
/// groups dropped.
#[derive(Debug, Default)]
pub(crate) struct GraphBuilder {
    nodes: Vec<GraphNode>,
    seen: HashSet<String>,
    edges: Vec<GraphEdge>,
}

impl GraphBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its key. Re-adding an existing key is a
    /// no-op that keeps the first-added record.
    pub(crate) fn add_node(
        &mut self,
        resource_type: ResourceType,
        id: &str,
        display_name: &str,
    ) -> String {
        let key = graph_node_key(resource_type, id);
        if self.seen.insert(key.clone()) {
            self.nodes.push(GraphNode {
                key: key.clone(),
                resource_type,
                id: id.to_string(),
                display_name: display_name.to_string(),
            });
        }
        key
    }

    /// Appends a directed labeled edge. No identity check: callers must
    /// not generate the same edge twice within one build.
    pub(crate) fn add_edge(&mut self, from: &str, to: &str, label: EdgeLabel) {
        self.edges.push(GraphEdge { from: from.to_string(), to: to.to_string(), label });
    }

    /// Assembles the graph, dropping groups with no members.
    pub(crate) fn finish(
        self,
        center: String,
        groups: Vec<GraphGroup>,
        lazy: Option<LazyRelations>,
    ) -> MetadataGraph {
        MetadataGraph {
            center,
            nodes: self.nodes,
            edges: self.edges,
            groups: groups.into_iter().filter(|group| !group.node_keys.is_empty()).collect(),
            lazy,
        }
    }
}
