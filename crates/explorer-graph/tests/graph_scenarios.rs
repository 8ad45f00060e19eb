//! End-to-end graph assembly scenarios against the fixture repository.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use explorer_graph::pipeline;
use explorer_graph::test_utils::InMemoryMetadataRepository;
use explorer_graph::{
    CategoryOptionComboPager, EdgeLabel, GraphEdge, GroupDirection, MetadataError,
    MetadataGraphService, MetadataItem, MetadataRepository, OptionComboPageRequest, ResourceType,
};

fn item(resource_type: ResourceType, value: Value) -> MetadataItem {
    MetadataItem::from_value(resource_type, value).unwrap()
}

fn service(repository: &Arc<InMemoryMetadataRepository>) -> MetadataGraphService {
    MetadataGraphService::new(Arc::clone(repository) as Arc<dyn MetadataRepository>)
}

fn has_edge(edges: &[GraphEdge], from: &str, to: &str, label: EdgeLabel) -> bool {
    edges
        .iter()
        .any(|edge| edge.from == from && edge.to == to && edge.label == label)
}

/// Combo `CC1` with one category `CAT1` holding options `OPT1`/`OPT2`,
/// unreferenced by any data element or data set.
fn combo_only_repository() -> Arc<InMemoryMetadataRepository> {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::CategoryCombos,
        json!({
            "id": "CC1",
            "displayName": "Combo 1",
            "categories": [
                {
                    "id": "CAT1",
                    "displayName": "Gender",
                    "categoryOptions": [
                        { "id": "OPT1", "displayName": "Female" },
                        { "id": "OPT2", "displayName": "Male" }
                    ]
                }
            ]
        }),
    ));
    repository
}

#[tokio::test]
async fn test_combo_graph_with_no_referencing_entities() {
    let repository = combo_only_repository();
    let graph = service(&repository)
        .execute(ResourceType::CategoryCombos, "CC1")
        .await
        .unwrap();

    assert_eq!(graph.center, "categoryCombos:CC1");
    let keys: Vec<_> = graph.nodes.iter().map(|node| node.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "categoryCombos:CC1",
            "categories:CAT1",
            "categoryOptions:OPT1",
            "categoryOptions:OPT2"
        ]
    );
    assert!(has_edge(&graph.edges, "categoryCombos:CC1", "categories:CAT1", EdgeLabel::Categories));
    assert!(has_edge(
        &graph.edges,
        "categories:CAT1",
        "categoryOptions:OPT1",
        EdgeLabel::CategoryOptions
    ));
    assert!(has_edge(
        &graph.edges,
        "categories:CAT1",
        "categoryOptions:OPT2",
        EdgeLabel::CategoryOptions
    ));
    assert_eq!(graph.edges.len(), 3);

    // empty data-element/data-set groups are dropped
    let titles: Vec<_> = graph.groups.iter().map(|group| group.title.as_str()).collect();
    assert_eq!(titles, vec!["Categories", "Category options"]);
    assert_eq!(graph.lazy_category_combo_id(), Some("CC1"));
}

#[tokio::test]
async fn test_data_element_graph_splits_override_and_plain_data_sets() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::DataElements,
        json!({
            "id": "DE1",
            "displayName": "Element 1",
            "categoryCombo": { "id": "CC1", "displayName": "Combo 1", "categories": [] }
        }),
    ));
    repository.insert(item(
        ResourceType::DataSets,
        json!({
            "id": "DS1",
            "displayName": "Override set",
            "dataSetElements": [
                {
                    "categoryCombo": { "id": "CC2", "displayName": "Combo 2" },
                    "dataElement": {
                        "id": "DE1",
                        "displayName": "Element 1",
                        "categoryCombo": { "id": "CC1", "displayName": "Combo 1" }
                    }
                }
            ]
        }),
    ));
    repository.insert(item(
        ResourceType::DataSets,
        json!({
            "id": "DS2",
            "displayName": "Plain set",
            "dataSetElements": [
                {
                    "categoryCombo": { "id": "CC1", "displayName": "Combo 1" },
                    "dataElement": {
                        "id": "DE1",
                        "displayName": "Element 1",
                        "categoryCombo": { "id": "CC1", "displayName": "Combo 1" }
                    }
                }
            ]
        }),
    ));

    let graph = service(&repository)
        .execute(ResourceType::DataElements, "DE1")
        .await
        .unwrap();

    assert_eq!(graph.center, "dataElements:DE1");
    assert!(has_edge(
        &graph.edges,
        "dataSets:DS1",
        "dataElements:DE1",
        EdgeLabel::DataSetsOverride
    ));
    assert!(has_edge(&graph.edges, "dataSets:DS2", "dataElements:DE1", EdgeLabel::DataSets));

    let plain = graph.groups.iter().find(|group| group.title == "Data sets").unwrap();
    let overriding =
        graph.groups.iter().find(|group| group.title == "Data sets (override)").unwrap();
    assert_eq!(plain.node_keys, vec!["dataSets:DS2"]);
    assert_eq!(plain.direction, GroupDirection::Parent);
    assert_eq!(overriding.node_keys, vec!["dataSets:DS1"]);
    assert_eq!(overriding.direction, GroupDirection::Parent);

    assert_eq!(graph.lazy_category_combo_id(), Some("CC1"));
}

#[tokio::test]
async fn test_option_graph_fan_out_with_zero_downstream_items() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::CategoryOptions,
        json!({ "id": "OPT1", "displayName": "Female" }),
    ));
    repository.insert(item(
        ResourceType::Categories,
        json!({
            "id": "CAT1",
            "displayName": "Gender",
            "categoryOptions": [{ "id": "OPT1" }]
        }),
    ));
    repository.insert(item(
        ResourceType::CategoryCombos,
        json!({
            "id": "CC1",
            "displayName": "Combo 1",
            "categories": [{ "id": "CAT1" }]
        }),
    ));

    let graph = service(&repository)
        .execute(ResourceType::CategoryOptions, "OPT1")
        .await
        .unwrap();

    assert_eq!(graph.center, "categoryOptions:OPT1");
    let categories = graph.groups.iter().find(|group| group.title == "Categories").unwrap();
    assert_eq!(categories.node_keys, vec!["categories:CAT1"]);
    assert_eq!(categories.direction, GroupDirection::Parent);
    assert!(has_edge(
        &graph.edges,
        "categories:CAT1",
        "categoryOptions:OPT1",
        EdgeLabel::CategoryOptions
    ));

    // the multi-hop fan-out found no data elements or data sets, so
    // those groups are dropped rather than empty
    assert!(graph.groups.iter().all(|group| {
        group.title != "Data elements"
            && group.title != "Data sets"
            && group.title != "Data sets (override)"
    }));
    assert!(graph.lazy.is_none());
}

#[tokio::test]
async fn test_option_graph_data_set_found_by_both_lookups_is_override_only() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::CategoryOptions,
        json!({ "id": "OPT1", "displayName": "Female" }),
    ));
    repository.insert(item(
        ResourceType::Categories,
        json!({
            "id": "CAT1",
            "displayName": "Gender",
            "categoryOptions": [{ "id": "OPT1" }]
        }),
    ));
    repository.insert(item(
        ResourceType::CategoryCombos,
        json!({
            "id": "CC1",
            "displayName": "Combo 1",
            "categories": [{ "id": "CAT1" }]
        }),
    ));
    repository.insert(item(
        ResourceType::DataElements,
        json!({
            "id": "DE1",
            "displayName": "Element 1",
            "categoryCombo": { "id": "CC1" }
        }),
    ));
    // surfaces through both reverse lookups: it owns CC1 and it also
    // contains DE1 with an override combo
    repository.insert(item(
        ResourceType::DataSets,
        json!({
            "id": "DS1",
            "displayName": "Set 1",
            "categoryCombo": { "id": "CC1" },
            "dataSetElements": [
                {
                    "categoryCombo": { "id": "CC2", "displayName": "Combo 2" },
                    "dataElement": {
                        "id": "DE1",
                        "displayName": "Element 1",
                        "categoryCombo": { "id": "CC1", "displayName": "Combo 1" }
                    }
                }
            ]
        }),
    ));

    let graph = service(&repository)
        .execute(ResourceType::CategoryOptions, "OPT1")
        .await
        .unwrap();

    let overriding =
        graph.groups.iter().find(|group| group.title == "Data sets (override)").unwrap();
    assert_eq!(overriding.node_keys, vec!["dataSets:DS1"]);
    assert!(graph.groups.iter().all(|group| group.title != "Data sets"));

    let ds_edges: Vec<_> = graph
        .edges
        .iter()
        .filter(|edge| edge.from == "dataSets:DS1")
        .collect();
    assert_eq!(ds_edges.len(), 1);
    assert_eq!(ds_edges[0].to, "categoryOptions:OPT1");
    assert_eq!(ds_edges[0].label, EdgeLabel::DataSetsOverride);
}

#[tokio::test]
async fn test_unsupported_type_fails_before_any_fetch() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    let error = service(&repository)
        .execute_named("organisationUnits", "OU1")
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        MetadataError::UnsupportedResourceType(name) if name == "organisationUnits"
    ));
    assert_eq!(repository.call_count(), 0);
}

#[tokio::test]
async fn test_data_set_graph_dedups_nodes_and_keeps_center() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::DataSets,
        json!({
            "id": "DS1",
            "displayName": "Set 1",
            "categoryCombo": {
                "id": "CC1",
                "displayName": "Combo 1",
                "categories": [
                    {
                        "id": "CAT1",
                        "displayName": "Gender",
                        "categoryOptions": [{ "id": "OPT1", "displayName": "Female" }]
                    }
                ]
            },
            "dataSetElements": [
                {
                    "categoryCombo": { "id": "CC2", "displayName": "Combo 2" },
                    "dataElement": {
                        "id": "DE1",
                        "displayName": "Element 1",
                        "categoryCombo": { "id": "CC1", "displayName": "Combo 1" }
                    }
                },
                {
                    "categoryCombo": { "id": "CC2", "displayName": "Combo 2" },
                    "dataElement": {
                        "id": "DE2",
                        "displayName": "Element 2",
                        "categoryCombo": { "id": "CC1", "displayName": "Combo 1" }
                    }
                }
            ]
        }),
    ));

    let graph = service(&repository).execute(ResourceType::DataSets, "DS1").await.unwrap();

    assert_eq!(graph.center, "dataSets:DS1");
    assert!(graph.nodes.iter().any(|node| node.key == graph.center));

    // CC2 appears in two entries but yields one node and one group slot
    let mut keys: Vec<_> = graph.nodes.iter().map(|node| node.key.clone()).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);

    let overrides = graph
        .groups
        .iter()
        .find(|group| group.title == "Category combos (override)")
        .unwrap();
    assert_eq!(overrides.node_keys, vec!["categoryCombos:CC2"]);
    assert!(has_edge(
        &graph.edges,
        "categoryCombos:CC2",
        "dataSets:DS1",
        EdgeLabel::CategoryComboOverride
    ));

    let elements = graph.groups.iter().find(|group| group.title == "Data elements").unwrap();
    assert_eq!(elements.node_keys, vec!["dataElements:DE1", "dataElements:DE2"]);
    assert_eq!(elements.direction, GroupDirection::Child);

    assert_eq!(graph.lazy_category_combo_id(), Some("CC1"));
}

#[tokio::test]
async fn test_option_combo_graph_links_combo_and_options() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::CategoryOptionCombos,
        json!({
            "id": "COC1",
            "displayName": "Female, Urban",
            "categoryCombo": { "id": "CC1", "displayName": "Combo 1" },
            "categoryOptions": [{ "id": "OPT1", "displayName": "Female" }]
        }),
    ));
    repository.insert(item(
        ResourceType::DataElements,
        json!({
            "id": "DE1",
            "displayName": "Element 1",
            "categoryCombo": { "id": "CC1" }
        }),
    ));

    let graph = service(&repository)
        .execute(ResourceType::CategoryOptionCombos, "COC1")
        .await
        .unwrap();

    assert_eq!(graph.center, "categoryOptionCombos:COC1");
    assert!(has_edge(
        &graph.edges,
        "categoryCombos:CC1",
        "categoryOptionCombos:COC1",
        EdgeLabel::CategoryOptionCombos
    ));
    assert!(has_edge(
        &graph.edges,
        "categoryOptionCombos:COC1",
        "categoryOptions:OPT1",
        EdgeLabel::CategoryOptions
    ));
    assert!(has_edge(
        &graph.edges,
        "dataElements:DE1",
        "categoryOptionCombos:COC1",
        EdgeLabel::DataElements
    ));
    assert_eq!(graph.lazy_category_combo_id(), Some("CC1"));
}

#[tokio::test]
async fn test_category_graph_reaches_data_sets_through_combos() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::Categories,
        json!({
            "id": "CAT1",
            "displayName": "Gender",
            "categoryOptions": [{ "id": "OPT1", "displayName": "Female" }]
        }),
    ));
    repository.insert(item(
        ResourceType::CategoryCombos,
        json!({
            "id": "CC1",
            "displayName": "Combo 1",
            "categories": [{ "id": "CAT1" }]
        }),
    ));
    repository.insert(item(
        ResourceType::DataSets,
        json!({
            "id": "DS1",
            "displayName": "Set 1",
            "categoryCombo": { "id": "CC1" }
        }),
    ));

    let graph = service(&repository).execute(ResourceType::Categories, "CAT1").await.unwrap();

    let titles: Vec<_> = graph.groups.iter().map(|group| group.title.as_str()).collect();
    assert_eq!(titles, vec!["Category combos", "Category options", "Data sets"]);
    // the discovered data set edges directly to the center, not to the
    // combo it was found through
    assert!(has_edge(&graph.edges, "dataSets:DS1", "categories:CAT1", EdgeLabel::DataSets));
    assert!(graph.lazy.is_none());
}

#[tokio::test]
async fn test_building_twice_is_idempotent() {
    let repository = combo_only_repository();
    let service = service(&repository);

    let first = service.execute(ResourceType::CategoryCombos, "CC1").await.unwrap();
    let second = service.execute(ResourceType::CategoryCombos, "CC1").await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fetch_failure_aborts_the_whole_build() {
    let repository = combo_only_repository();
    repository.fail_with(MetadataError::Transport("connection refused".to_string()));

    let result = service(&repository).execute(ResourceType::CategoryCombos, "CC1").await;

    assert!(matches!(
        result,
        Err(MetadataError::Transport(message)) if message == "connection refused"
    ));
}

#[tokio::test]
async fn test_lazy_page_merge_replaces_previous_page() {
    let repository = combo_only_repository();
    for i in 1..=3 {
        repository.insert(item(
            ResourceType::CategoryOptionCombos,
            json!({
                "id": format!("COC{i}"),
                "displayName": format!("Coc {i}"),
                "categoryCombo": { "id": "CC1" }
            }),
        ));
    }

    let graph = service(&repository)
        .execute(ResourceType::CategoryCombos, "CC1")
        .await
        .unwrap();
    let combo_id = graph.lazy_category_combo_id().unwrap().to_string();

    let pager =
        CategoryOptionComboPager::new(Arc::clone(&repository) as Arc<dyn MetadataRepository>);
    let first_page = pager
        .execute(&OptionComboPageRequest {
            category_combo_id: combo_id.clone(),
            page: 1,
            page_size: 2,
        })
        .await
        .unwrap();
    let second_page = pager
        .execute(&OptionComboPageRequest { category_combo_id: combo_id, page: 2, page_size: 2 })
        .await
        .unwrap();
    assert_eq!(first_page.pager.unwrap().page_count, 2);

    let with_first = graph.merge_category_option_combos(&first_page);
    let coc_group = with_first
        .groups
        .iter()
        .find(|group| group.title == "Category option combos")
        .unwrap();
    assert_eq!(
        coc_group.node_keys,
        vec!["categoryOptionCombos:COC1", "categoryOptionCombos:COC2"]
    );

    let with_second = with_first.merge_category_option_combos(&second_page);
    let coc_group = with_second
        .groups
        .iter()
        .find(|group| group.title == "Category option combos")
        .unwrap();
    assert_eq!(coc_group.node_keys, vec!["categoryOptionCombos:COC3"]);
    assert!(with_second.nodes.iter().all(|node| node.id != "COC1" && node.id != "COC2"));
    // the eager part of the graph is untouched by paging
    assert!(with_second.nodes.iter().any(|node| node.key == "categories:CAT1"));
}

#[tokio::test]
async fn test_cancellation_yields_no_result_and_no_error() {
    let repository = Arc::new(InMemoryMetadataRepository::new());
    repository.insert(item(
        ResourceType::DataElements,
        json!({
            "id": "DE1",
            "displayName": "Element 1",
            "categoryCombo": { "id": "CC1", "displayName": "Combo 1", "categories": [] }
        }),
    ));
    repository.delay_responses(Duration::from_millis(200));
    let service = service(&repository);

    let (build, handle) = pipeline::cancelable(async move {
        service.execute(ResourceType::DataElements, "DE1").await
    });
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let outcome = build.await;
    assert!(outcome.is_none());
    // the build was stopped inside its first fetch
    assert_eq!(repository.call_count(), 1);
}
