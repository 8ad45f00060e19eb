//! Value types for the assembled metadata graph.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use explorer_interfaces::metadata::{Id, MetadataList, ResourceType};

/// Group id used for lazily merged category option combos; each merge
/// replaces this group wholesale.
pub const OPTION_COMBO_GROUP_ID: &str = "category-option-combos";

/// Deterministic node identity: `"{type}:{id}"`. The sole
/// deduplication key within one graph.
pub fn graph_node_key(resource_type: ResourceType, id: &str) -> String {
    format!("{}:{}", resource_type, id)
}

/// A deduplicated projection of a metadata item for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Node key, `"{type}:{id}"`
    pub key: String,
    /// Resource type of the underlying entity
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Entity id
    pub id: Id,
    /// Display name, falling back to name, then the id
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Relationship names carried by graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeLabel {
    /// Entity → its category combo
    CategoryCombo,
    /// Combo → one of its categories
    Categories,
    /// Category (or coc) → one of its options
    CategoryOptions,
    /// Data-element relation toward the center
    DataElements,
    /// Data-set relation toward the center
    DataSets,
    /// Data set assigning an override combo to a center element
    DataSetsOverride,
    /// Override combo → the data set assigning it
    CategoryComboOverride,
    /// Combo → one of its option combos
    CategoryOptionCombos,
}

impl EdgeLabel {
    /// The relationship name as rendered on edges.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::CategoryCombo => "categoryCombo",
            EdgeLabel::Categories => "categories",
            EdgeLabel::CategoryOptions => "categoryOptions",
            EdgeLabel::DataElements => "dataElements",
            EdgeLabel::DataSets => "dataSets",
            EdgeLabel::DataSetsOverride => "dataSetsOverride",
            EdgeLabel::CategoryComboOverride => "categoryComboOverride",
            EdgeLabel::CategoryOptionCombos => "categoryOptionCombos",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, labeled relation between two nodes. Edges are appended
/// as generated; identical duplicates are not collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// Source node key
    pub from: String,
    /// Target node key
    pub to: String,
    /// Relationship name
    pub label: EdgeLabel,
}

/// Layout side of a group relative to the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupDirection {
    /// Ancestor-like, rendered opposite from children
    Parent,
    /// Descendant-like
    Child,
}

/// A named cluster of node keys used purely for layout. Groups with no
/// members never appear in a returned graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphGroup {
    /// Stable group id
    pub id: String,
    /// Human-readable group title
    pub title: String,
    /// Member node keys
    #[serde(rename = "nodeKeys")]
    pub node_keys: Vec<String>,
    /// Layout side
    pub direction: GroupDirection,
}

impl GraphGroup {
    /// Creates a group over the given member keys.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        node_keys: Vec<String>,
        direction: GroupDirection,
    ) -> Self {
        Self { id: id.into(), title: title.into(), node_keys, direction }
    }
}

/// Marker for the lazily fetched category-option-combo relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LazyCategoryOptionCombos {
    /// Combo whose option combos were intentionally not fetched
    #[serde(rename = "categoryComboId")]
    pub category_combo_id: Id,
}

/// Relations deliberately excluded from the eager build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LazyRelations {
    /// Category option combos to page in separately
    #[serde(rename = "categoryOptionCombos", skip_serializing_if = "Option::is_none")]
    pub category_option_combos: Option<LazyCategoryOptionCombos>,
}

impl LazyRelations {
    /// A lazy marker for the given combo id.
    pub fn option_combos_of(category_combo_id: impl Into<Id>) -> Self {
        Self {
            category_option_combos: Some(LazyCategoryOptionCombos {
                category_combo_id: category_combo_id.into(),
            }),
        }
    }
}

/// The full result of one graph build. Immutable once returned; the
/// lazy extension produces a new value via
/// [`MetadataGraph::merge_category_option_combos`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataGraph {
    /// Node key of the focal entity; always present in `nodes`
    pub center: String,
    /// Deduplicated nodes in first-insertion order
    pub nodes: Vec<GraphNode>,
    /// Directed labeled edges
    pub edges: Vec<GraphEdge>,
    /// Non-empty layout groups in declaration order
    pub groups: Vec<GraphGroup>,
    /// Lazy sub-resource marker, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lazy: Option<LazyRelations>,
}

impl MetadataGraph {
    /// The combo id to page option combos against, when the build
    /// flagged one.
    pub fn lazy_category_combo_id(&self) -> Option<&str> {
        self.lazy
            .as_ref()
            .and_then(|lazy| lazy.category_option_combos.as_ref())
            .map(|marker| marker.category_combo_id.as_str())
    }

    /// Merges one page of category option combos into this graph,
    /// producing a new graph value. The previously merged
    /// `category-option-combos` group (if any) is replaced wholesale:
    /// its exclusive nodes and edges are dropped before the page is
    /// applied. New nodes hang off the lazy combo node with one
    /// `categoryOptionCombos` edge each. Without a lazy marker the
    /// graph is returned unchanged.
    pub fn merge_category_option_combos(
        &self,
        page: &MetadataList,
    ) -> MetadataGraph {
        let Some(combo_id) = self.lazy_category_combo_id() else {
            return self.clone();
        };
        let combo_key = graph_node_key(ResourceType::CategoryCombos, combo_id);

        let prior_members: HashSet<&str> = self
            .groups
            .iter()
            .filter(|group| group.id == OPTION_COMBO_GROUP_ID)
            .flat_map(|group| group.node_keys.iter().map(String::as_str))
            .collect();
        let kept_elsewhere: HashSet<&str> = self
            .groups
            .iter()
            .filter(|group| group.id != OPTION_COMBO_GROUP_ID)
            .flat_map(|group| group.node_keys.iter().map(String::as_str))
            .chain(std::iter::once(self.center.as_str()))
            .collect();
        let removed: HashSet<&str> = prior_members
            .iter()
            .copied()
            .filter(|key| !kept_elsewhere.contains(key))
            .collect();

        let mut nodes: Vec<GraphNode> = self
            .nodes
            .iter()
            .filter(|node| !removed.contains(node.key.as_str()))
            .cloned()
            .collect();
        let mut edges: Vec<GraphEdge> = self
            .edges
            .iter()
            .filter(|edge| {
                !(edge.label == EdgeLabel::CategoryOptionCombos
                    && edge.from == combo_key
                    && edge.to != self.center
                    && prior_members.contains(edge.to.as_str()))
            })
            .cloned()
            .collect();
        let mut groups: Vec<GraphGroup> = self
            .groups
            .iter()
            .filter(|group| group.id != OPTION_COMBO_GROUP_ID)
            .cloned()
            .collect();

        let mut present: HashSet<String> = nodes.iter().map(|node| node.key.clone()).collect();
        let mut member_keys: Vec<String> = Vec::new();
        for item in &page.items {
            let key = graph_node_key(ResourceType::CategoryOptionCombos, &item.id);
            if present.insert(key.clone()) {
                nodes.push(GraphNode {
                    key: key.clone(),
                    resource_type: ResourceType::CategoryOptionCombos,
                    id: item.id.clone(),
                    display_name: item.display_label().to_string(),
                });
                edges.push(GraphEdge {
                    from: combo_key.clone(),
                    to: key.clone(),
                    label: EdgeLabel::CategoryOptionCombos,
                });
            }
            if !member_keys.contains(&key) {
                member_keys.push(key);
            }
        }
        if !member_keys.is_empty() {
            groups.push(GraphGroup::new(
                OPTION_COMBO_GROUP_ID,
                "Category option combos",
                member_keys,
                GroupDirection::Child,
            ));
        }

        MetadataGraph {
            center: self.center.clone(),
            nodes,
            edges,
            groups,
            lazy: self.lazy.clone(),
        }
    }
}
