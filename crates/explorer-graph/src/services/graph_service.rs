//! Graph assembly engine: builds a relation graph around one center
//! entity, one builder per resource type.
//!
//! Each builder runs the same shape of work: fetch the center with its
//! eager expansions, discover related entities through filtered lists
//! (strictly sequential), then assemble nodes, edges and layout groups
//! through a per-build [`GraphBuilder`]. Multi-hop discoveries edge
//! directly to the center; intermediate hops only contribute filter
//! ids. Category option combos are never fetched eagerly: builders
//! whose center has a combo flag them as a lazy relation instead.

use std::sync::Arc;

use tracing::{debug, instrument};

use explorer_interfaces::metadata::{
    Field, FieldSelection, Id, MetadataFilter, MetadataItem, MetadataQuery, MetadataRepository,
    MetadataResult, ResourceType,
};

use crate::graph::{
    EdgeLabel, GraphBuilder, GraphGroup, GroupDirection, LazyRelations, MetadataGraph,
    OPTION_COMBO_GROUP_ID,
};
use crate::services::fanout;
use crate::services::views::{
    CategoryComboView, CategoryOptionComboView, CategoryView, DataElementView, DataSetView,
    NamedRef,
};

/// Builds relation graphs around metadata entities.
pub struct MetadataGraphService {
    repository: Arc<dyn MetadataRepository>,
}

impl MetadataGraphService {
    /// Creates an engine over the given access port.
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    /// Entry point for callers holding a raw resource name (e.g. a URL
    /// segment). Unknown names are rejected before any fetch happens.
    pub async fn execute_named(
        &self,
        resource_type: &str,
        id: &str,
    ) -> MetadataResult<MetadataGraph> {
        let resource_type: ResourceType = resource_type.parse()?;
        self.execute(resource_type, id).await
    }

    /// Builds the graph for one center entity.
    #[instrument(skip(self))]
    pub async fn execute(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> MetadataResult<MetadataGraph> {
        let graph = match resource_type {
            ResourceType::DataElements => self.build_data_element_graph(id).await?,
            ResourceType::DataSets => self.build_data_set_graph(id).await?,
            ResourceType::Categories => self.build_category_graph(id).await?,
            ResourceType::CategoryCombos => self.build_category_combo_graph(id).await?,
            ResourceType::CategoryOptions => self.build_category_option_graph(id).await?,
            ResourceType::CategoryOptionCombos => {
                self.build_category_option_combo_graph(id).await?
            }
        };
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            groups = graph.groups.len(),
            "assembled metadata graph"
        );
        Ok(graph)
    }

    async fn build_data_element_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let element: DataElementView = repository
            .get(ResourceType::DataElements, id, &data_element_fields())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::DataElements,
            &element.named.id,
            element.named.display_label(),
        );

        let mut combo_keys = Vec::new();
        let mut category_keys = CategoryKeys::default();
        if let Some(combo) = &element.category_combo {
            let combo_key = builder.add_node(
                ResourceType::CategoryCombos,
                &combo.named.id,
                combo.named.display_label(),
            );
            builder.add_edge(&center, &combo_key, EdgeLabel::CategoryCombo);
            category_keys = add_categories(&mut builder, &combo_key, &combo.categories);
            combo_keys.push(combo_key);
        }

        let data_sets = fanout::data_sets_for_data_elements(
            repository,
            std::slice::from_ref(&element.named.id),
        )
        .await?;
        let (plain, overriding) = split_override_data_sets(&data_sets)?;
        let (plain_keys, override_keys) = add_data_sets(&mut builder, &center, &plain, &overriding);

        let lazy = element
            .category_combo
            .as_ref()
            .map(|combo| LazyRelations::option_combos_of(combo.named.id.clone()));

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "category-combo",
                    "Category combo",
                    combo_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    "categories",
                    "Categories",
                    category_keys.categories,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "category-options",
                    "Categories options",
                    category_keys.options,
                    GroupDirection::Child,
                ),
                GraphGroup::new("data-sets", "Data sets", plain_keys, GroupDirection::Parent),
                GraphGroup::new(
                    "data-sets-override",
                    "Data sets (override)",
                    override_keys,
                    GroupDirection::Parent,
                ),
            ],
            lazy,
        ))
    }

    async fn build_category_combo_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let combo: CategoryComboView = repository
            .get(ResourceType::CategoryCombos, id, &category_combo_fields())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::CategoryCombos,
            &combo.named.id,
            combo.named.display_label(),
        );
        let category_keys = add_categories(&mut builder, &center, &combo.categories);

        let elements = repository
            .list(
                &MetadataQuery::unpaged(ResourceType::DataElements, FieldSelection::named_ref())
                    .with_filter(MetadataFilter::eq("categoryCombo.id", &combo.named.id)),
            )
            .await?;
        let element_keys = add_listed(
            &mut builder,
            &center,
            &elements.items,
            EdgeLabel::DataElements,
            Direction::FromCenter,
        );

        let data_sets = repository
            .list(
                &MetadataQuery::unpaged(ResourceType::DataSets, FieldSelection::named_ref())
                    .with_filter(MetadataFilter::eq("categoryCombo.id", &combo.named.id)),
            )
            .await?;
        let data_set_keys = add_listed(
            &mut builder,
            &center,
            &data_sets.items,
            EdgeLabel::DataSets,
            Direction::FromCenter,
        );

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "categories",
                    "Categories",
                    category_keys.categories,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "category-options",
                    "Category options",
                    category_keys.options,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "data-elements",
                    "Data elements",
                    element_keys,
                    GroupDirection::Child,
                ),
                GraphGroup::new("data-sets", "Data sets", data_set_keys, GroupDirection::Child),
            ],
            Some(LazyRelations::option_combos_of(combo.named.id.clone())),
        ))
    }

    async fn build_category_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let category: CategoryView = repository
            .get(ResourceType::Categories, id, &category_fields())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::Categories,
            &category.named.id,
            category.named.display_label(),
        );

        let combos = repository
            .list(
                &MetadataQuery::unpaged(ResourceType::CategoryCombos, FieldSelection::named_ref())
                    .with_filter(MetadataFilter::eq("categories.id", &category.named.id)),
            )
            .await?;
        let combo_keys = add_listed(
            &mut builder,
            &center,
            &combos.items,
            EdgeLabel::Categories,
            Direction::ToCenter,
        );

        let mut option_keys = Vec::new();
        for option in &category.category_options {
            let key = builder.add_node(
                ResourceType::CategoryOptions,
                &option.id,
                option.display_label(),
            );
            builder.add_edge(&center, &key, EdgeLabel::CategoryOptions);
            if !option_keys.contains(&key) {
                option_keys.push(key);
            }
        }

        let data_sets = fanout::data_sets_for_combos(repository, &item_ids(&combos.items)).await?;
        let data_set_keys =
            add_listed(&mut builder, &center, &data_sets, EdgeLabel::DataSets, Direction::ToCenter);

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "category-combos",
                    "Category combos",
                    combo_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    "category-options",
                    "Category options",
                    option_keys,
                    GroupDirection::Child,
                ),
                GraphGroup::new("data-sets", "Data sets", data_set_keys, GroupDirection::Parent),
            ],
            None,
        ))
    }

    async fn build_category_option_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let option: NamedRef = repository
            .get(ResourceType::CategoryOptions, id, &FieldSelection::named_ref())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::CategoryOptions,
            &option.id,
            option.display_label(),
        );

        let categories = repository
            .list(
                &MetadataQuery::unpaged(ResourceType::Categories, FieldSelection::named_ref())
                    .with_filter(MetadataFilter::eq("categoryOptions.id", &option.id)),
            )
            .await?;
        let category_keys = add_listed(
            &mut builder,
            &center,
            &categories.items,
            EdgeLabel::CategoryOptions,
            Direction::ToCenter,
        );

        // combos are discovery-only hops here; they contribute filter
        // ids but no nodes
        let combos =
            fanout::category_combos_for_categories(repository, &item_ids(&categories.items))
                .await?;
        let combo_ids = item_ids(&combos);

        let elements = fanout::data_elements_for_combos(repository, &combo_ids).await?;
        let element_keys = add_listed(
            &mut builder,
            &center,
            &elements,
            EdgeLabel::DataElements,
            Direction::ToCenter,
        );

        let combo_sets = fanout::data_sets_for_combos(repository, &combo_ids).await?;
        let element_sets =
            fanout::data_sets_for_data_elements(repository, &item_ids(&elements)).await?;
        let data_sets = fanout::dedup_by_id(combo_sets.into_iter().chain(element_sets));
        let (plain, overriding) = split_override_data_sets(&data_sets)?;
        let (plain_keys, override_keys) = add_data_sets(&mut builder, &center, &plain, &overriding);

        let option_combos = repository
            .list(
                &MetadataQuery::unpaged(
                    ResourceType::CategoryOptionCombos,
                    FieldSelection::named_ref(),
                )
                .with_filter(MetadataFilter::eq("categoryOptions.id", &option.id)),
            )
            .await?;
        let option_combo_keys = add_listed(
            &mut builder,
            &center,
            &option_combos.items,
            EdgeLabel::CategoryOptionCombos,
            Direction::FromCenter,
        );

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "categories",
                    "Categories",
                    category_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    "data-elements",
                    "Data elements",
                    element_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new("data-sets", "Data sets", plain_keys, GroupDirection::Parent),
                GraphGroup::new(
                    "data-sets-override",
                    "Data sets (override)",
                    override_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    OPTION_COMBO_GROUP_ID,
                    "Category option combos",
                    option_combo_keys,
                    GroupDirection::Child,
                ),
            ],
            None,
        ))
    }

    async fn build_category_option_combo_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let option_combo: CategoryOptionComboView = repository
            .get(ResourceType::CategoryOptionCombos, id, &option_combo_fields())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::CategoryOptionCombos,
            &option_combo.named.id,
            option_combo.named.display_label(),
        );

        let mut combo_keys = Vec::new();
        if let Some(combo) = &option_combo.category_combo {
            let combo_key =
                builder.add_node(ResourceType::CategoryCombos, &combo.id, combo.display_label());
            builder.add_edge(&combo_key, &center, EdgeLabel::CategoryOptionCombos);
            combo_keys.push(combo_key);
        }

        let mut option_keys = Vec::new();
        for option in &option_combo.category_options {
            let key = builder.add_node(
                ResourceType::CategoryOptions,
                &option.id,
                option.display_label(),
            );
            builder.add_edge(&center, &key, EdgeLabel::CategoryOptions);
            if !option_keys.contains(&key) {
                option_keys.push(key);
            }
        }

        let mut element_keys = Vec::new();
        let mut plain_keys = Vec::new();
        let mut override_keys = Vec::new();
        if let Some(combo) = &option_combo.category_combo {
            let elements =
                fanout::data_elements_for_combos(repository, std::slice::from_ref(&combo.id))
                    .await?;
            element_keys = add_listed(
                &mut builder,
                &center,
                &elements,
                EdgeLabel::DataElements,
                Direction::ToCenter,
            );

            let combo_sets =
                fanout::data_sets_for_combos(repository, std::slice::from_ref(&combo.id)).await?;
            let element_sets =
                fanout::data_sets_for_data_elements(repository, &item_ids(&elements)).await?;
            let data_sets = fanout::dedup_by_id(combo_sets.into_iter().chain(element_sets));
            let (plain, overriding) = split_override_data_sets(&data_sets)?;
            (plain_keys, override_keys) = add_data_sets(&mut builder, &center, &plain, &overriding);
        }

        let lazy = option_combo
            .category_combo
            .as_ref()
            .map(|combo| LazyRelations::option_combos_of(combo.id.clone()));

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "category-combo",
                    "Category combo",
                    combo_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    "category-options",
                    "Category options",
                    option_keys,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "data-elements",
                    "Data elements",
                    element_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new("data-sets", "Data sets", plain_keys, GroupDirection::Parent),
                GraphGroup::new(
                    "data-sets-override",
                    "Data sets (override)",
                    override_keys,
                    GroupDirection::Parent,
                ),
            ],
            lazy,
        ))
    }

    async fn build_data_set_graph(&self, id: &str) -> MetadataResult<MetadataGraph> {
        let repository = self.repository.as_ref();
        let data_set: DataSetView = repository
            .get(ResourceType::DataSets, id, &data_set_center_fields())
            .await?
            .decode()?;

        let mut builder = GraphBuilder::new();
        let center = builder.add_node(
            ResourceType::DataSets,
            &data_set.named.id,
            data_set.named.display_label(),
        );

        let mut combo_keys = Vec::new();
        let mut category_keys = CategoryKeys::default();
        if let Some(combo) = &data_set.category_combo {
            let combo_key = builder.add_node(
                ResourceType::CategoryCombos,
                &combo.named.id,
                combo.named.display_label(),
            );
            builder.add_edge(&center, &combo_key, EdgeLabel::CategoryCombo);
            category_keys = add_categories(&mut builder, &combo_key, &combo.categories);
            combo_keys.push(combo_key);
        }

        let mut element_keys = Vec::new();
        let mut override_keys = Vec::new();
        for entry in &data_set.data_set_elements {
            if let Some(element) = &entry.data_element {
                let key = builder.add_node(
                    ResourceType::DataElements,
                    &element.named.id,
                    element.named.display_label(),
                );
                if !element_keys.contains(&key) {
                    builder.add_edge(&center, &key, EdgeLabel::DataElements);
                    element_keys.push(key);
                }
            }
            if entry.overrides_default_combo() {
                if let Some(assigned) = &entry.category_combo {
                    let key = builder.add_node(
                        ResourceType::CategoryCombos,
                        &assigned.id,
                        assigned.display_label(),
                    );
                    if !override_keys.contains(&key) {
                        builder.add_edge(&key, &center, EdgeLabel::CategoryComboOverride);
                        override_keys.push(key);
                    }
                }
            }
        }

        let lazy = data_set
            .category_combo
            .as_ref()
            .map(|combo| LazyRelations::option_combos_of(combo.named.id.clone()));

        Ok(builder.finish(
            center,
            vec![
                GraphGroup::new(
                    "category-combo",
                    "Category combo",
                    combo_keys,
                    GroupDirection::Parent,
                ),
                GraphGroup::new(
                    "categories",
                    "Categories",
                    category_keys.categories,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "category-options",
                    "Category options",
                    category_keys.options,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "data-elements",
                    "Data elements",
                    element_keys,
                    GroupDirection::Child,
                ),
                GraphGroup::new(
                    "category-combos-override",
                    "Category combos (override)",
                    override_keys,
                    GroupDirection::Parent,
                ),
            ],
            lazy,
        ))
    }
}

/// Node keys collected while expanding a combo's categories.
#[derive(Debug, Default)]
struct CategoryKeys {
    categories: Vec<String>,
    options: Vec<String>,
}

/// Which endpoint of a listed-entity edge is the center.
#[derive(Debug, Clone, Copy)]
enum Direction {
    FromCenter,
    ToCenter,
}

/// Adds category and option nodes under the given combo key, with
/// combo→category and category→option edges.
fn add_categories(
    builder: &mut GraphBuilder,
    combo_key: &str,
    categories: &[CategoryView],
) -> CategoryKeys {
    let mut keys = CategoryKeys::default();
    for category in categories {
        let category_key = builder.add_node(
            ResourceType::Categories,
            &category.named.id,
            category.named.display_label(),
        );
        builder.add_edge(combo_key, &category_key, EdgeLabel::Categories);
        if !keys.categories.contains(&category_key) {
            keys.categories.push(category_key.clone());
        }
        for option in &category.category_options {
            let option_key = builder.add_node(
                ResourceType::CategoryOptions,
                &option.id,
                option.display_label(),
            );
            builder.add_edge(&category_key, &option_key, EdgeLabel::CategoryOptions);
            if !keys.options.contains(&option_key) {
                keys.options.push(option_key);
            }
        }
    }
    keys
}

/// Adds one node per listed item with an edge to or from the center,
/// returning the member keys in arrival order.
fn add_listed(
    builder: &mut GraphBuilder,
    center: &str,
    items: &[MetadataItem],
    label: EdgeLabel,
    direction: Direction,
) -> Vec<String> {
    let mut keys = Vec::new();
    for item in items {
        let key = builder.add_node(item.resource_type, &item.id, item.display_label());
        if !keys.contains(&key) {
            match direction {
                Direction::FromCenter => builder.add_edge(center, &key, label),
                Direction::ToCenter => builder.add_edge(&key, center, label),
            }
            keys.push(key);
        }
    }
    keys
}

/// Partitions data sets into plain and override ones. A data set
/// overrides when any of its entries assigns a combo different from
/// the element's default.
fn split_override_data_sets(
    items: &[MetadataItem],
) -> MetadataResult<(Vec<DataSetView>, Vec<DataSetView>)> {
    let mut plain = Vec::new();
    let mut overriding = Vec::new();
    for item in items {
        let view: DataSetView = item.decode()?;
        if view.has_combo_override() {
            overriding.push(view);
        } else {
            plain.push(view);
        }
    }
    Ok((plain, overriding))
}

/// Adds data-set nodes with dataSet / dataSetsOverride edges toward
/// the center, returning (plain keys, override keys).
fn add_data_sets(
    builder: &mut GraphBuilder,
    center: &str,
    plain: &[DataSetView],
    overriding: &[DataSetView],
) -> (Vec<String>, Vec<String>) {
    let mut plain_keys = Vec::new();
    for view in plain {
        let key = builder.add_node(
            ResourceType::DataSets,
            &view.named.id,
            view.named.display_label(),
        );
        builder.add_edge(&key, center, EdgeLabel::DataSets);
        plain_keys.push(key);
    }
    let mut override_keys = Vec::new();
    for view in overriding {
        let key = builder.add_node(
            ResourceType::DataSets,
            &view.named.id,
            view.named.display_label(),
        );
        builder.add_edge(&key, center, EdgeLabel::DataSetsOverride);
        override_keys.push(key);
    }
    (plain_keys, override_keys)
}

fn item_ids(items: &[MetadataItem]) -> Vec<Id> {
    items.iter().map(|item| item.id.clone()).collect()
}

fn named_ref_fields() -> Vec<Field> {
    vec![Field::leaf("id"), Field::leaf("displayName")]
}

/// `categoryCombo[...]` expanded down to category options.
fn combo_expansion() -> Field {
    Field::nested("categoryCombo", combo_children())
}

fn combo_children() -> Vec<Field> {
    vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        Field::nested(
            "categories",
            vec![
                Field::leaf("id"),
                Field::leaf("displayName"),
                Field::nested("categoryOptions", named_ref_fields()),
            ],
        ),
    ]
}

fn data_element_fields() -> FieldSelection {
    FieldSelection::new(vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        combo_expansion(),
    ])
}

fn category_combo_fields() -> FieldSelection {
    FieldSelection::new(combo_children())
}

fn category_fields() -> FieldSelection {
    FieldSelection::new(vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        Field::nested("categoryOptions", named_ref_fields()),
    ])
}

fn option_combo_fields() -> FieldSelection {
    FieldSelection::new(vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        Field::nested("categoryCombo", named_ref_fields()),
        Field::nested("categoryOptions", named_ref_fields()),
    ])
}

fn data_set_center_fields() -> FieldSelection {
    FieldSelection::new(vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        combo_expansion(),
        fanout::data_set_elements_field(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryMetadataRepository;
    use explorer_interfaces::metadata::MetadataError;
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_named_rejects_unknown_type_without_fetching() {
        let repository = Arc::new(InMemoryMetadataRepository::new());
        let service =
            MetadataGraphService::new(Arc::clone(&repository) as Arc<dyn MetadataRepository>);

        let error = service.execute_named("indicators", "ID1").await.unwrap_err();
        assert!(
            matches!(error, MetadataError::UnsupportedResourceType(name) if name == "indicators")
        );
        assert_eq!(repository.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_center_propagates_not_found() {
        let repository = Arc::new(InMemoryMetadataRepository::new());
        let service =
            MetadataGraphService::new(Arc::clone(&repository) as Arc<dyn MetadataRepository>);

        let error = service
            .execute(ResourceType::DataElements, "missing")
            .await
            .unwrap_err();
        assert!(matches!(error, MetadataError::NotFound { id, .. } if id == "missing"));
    }

    #[tokio::test]
    async fn test_data_element_without_combo_has_no_lazy_marker() {
        let repository = Arc::new(InMemoryMetadataRepository::new());
        repository.insert(
            explorer_interfaces::metadata::MetadataItem::from_value(
                ResourceType::DataElements,
                json!({ "id": "DE1", "displayName": "Element 1" }),
            )
            .unwrap(),
        );
        let service =
            MetadataGraphService::new(Arc::clone(&repository) as Arc<dyn MetadataRepository>);

        let graph = service.execute(ResourceType::DataElements, "DE1").await.unwrap();
        assert_eq!(graph.center, "dataElements:DE1");
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.lazy.is_none());
        assert!(graph.groups.is_empty());
    }
}
