//! Multi-hop relation discovery: one filtered list per source id, run
//! strictly in sequence, then merged with first-occurrence dedup.

use explorer_interfaces::metadata::{
    Field, FieldSelection, Id, MetadataFilter, MetadataItem, MetadataList, MetadataQuery,
    MetadataRepository, MetadataResult, ResourceType,
};

use crate::pipeline;

/// The `dataSetElements[...]` expansion carrying both combo sides
/// needed for override classification.
pub(crate) fn data_set_elements_field() -> Field {
    Field::nested(
        "dataSetElements",
        vec![
            Field::nested(
                "categoryCombo",
                vec![Field::leaf("id"), Field::leaf("displayName")],
            ),
            Field::nested(
                "dataElement",
                vec![
                    Field::leaf("id"),
                    Field::leaf("displayName"),
                    Field::nested(
                        "categoryCombo",
                        vec![Field::leaf("id"), Field::leaf("displayName")],
                    ),
                ],
            ),
        ],
    )
}

/// Field selection for data sets fetched during discovery.
pub(crate) fn data_set_fields() -> FieldSelection {
    FieldSelection::new(vec![
        Field::leaf("id"),
        Field::leaf("displayName"),
        data_set_elements_field(),
    ])
}

/// Category combos that use any of the given categories.
pub(crate) async fn category_combos_for_categories(
    repository: &dyn MetadataRepository,
    category_ids: &[Id],
) -> MetadataResult<Vec<MetadataItem>> {
    list_related(
        repository,
        ResourceType::CategoryCombos,
        "categories.id",
        category_ids,
        FieldSelection::named_ref(),
    )
    .await
}

/// Data elements whose default combo is one of the given combos.
pub(crate) async fn data_elements_for_combos(
    repository: &dyn MetadataRepository,
    combo_ids: &[Id],
) -> MetadataResult<Vec<MetadataItem>> {
    list_related(
        repository,
        ResourceType::DataElements,
        "categoryCombo.id",
        combo_ids,
        FieldSelection::named_ref(),
    )
    .await
}

/// Data sets whose own combo is one of the given combos, fetched with
/// the override-classification expansion.
pub(crate) async fn data_sets_for_combos(
    repository: &dyn MetadataRepository,
    combo_ids: &[Id],
) -> MetadataResult<Vec<MetadataItem>> {
    list_related(
        repository,
        ResourceType::DataSets,
        "categoryCombo.id",
        combo_ids,
        data_set_fields(),
    )
    .await
}

/// Data sets containing any of the given data elements, fetched with
/// the override-classification expansion.
pub(crate) async fn data_sets_for_data_elements(
    repository: &dyn MetadataRepository,
    element_ids: &[Id],
) -> MetadataResult<Vec<MetadataItem>> {
    list_related(
        repository,
        ResourceType::DataSets,
        "dataSetElements.dataElement.id",
        element_ids,
        data_set_fields(),
    )
    .await
}

async fn list_related(
    repository: &dyn MetadataRepository,
    resource_type: ResourceType,
    property: &str,
    ids: &[Id],
    fields: FieldSelection,
) -> MetadataResult<Vec<MetadataItem>> {
    let queries: Vec<MetadataQuery> = ids
        .iter()
        .map(|id| {
            MetadataQuery::unpaged(resource_type, fields.clone())
                .with_filter(MetadataFilter::eq(property, id))
        })
        .collect();
    let lists = pipeline::sequential(queries.iter().map(|query| repository.list(query))).await?;
    Ok(dedup_by_id(
        lists.into_iter().flat_map(|list: MetadataList| list.items),
    ))
}

/// Keeps the first occurrence of each id, preserving arrival order.
pub(crate) fn dedup_by_id(items: impl IntoIterator<Item = MetadataItem>) -> Vec<MetadataItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryMetadataRepository;
    use explorer_interfaces::metadata::MetadataItem;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data_set(id: &str, combo_id: &str) -> MetadataItem {
        MetadataItem::from_value(
            ResourceType::DataSets,
            json!({
                "id": id,
                "displayName": id,
                "categoryCombo": { "id": combo_id }
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_data_sets_for_combos_merges_with_dedup() {
        let repository = InMemoryMetadataRepository::new();
        repository.insert(data_set("DS1", "CC1"));
        repository.insert(data_set("DS2", "CC2"));
        repository.insert(data_set("DS3", "CC1"));

        let items = data_sets_for_combos(
            &repository,
            &["CC1".to_string(), "CC2".to_string(), "CC1".to_string()],
        )
        .await
        .unwrap();

        let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["DS1", "DS3", "DS2"]);
    }

    #[tokio::test]
    async fn test_empty_id_list_issues_no_queries() {
        let repository = InMemoryMetadataRepository::new();
        let items = data_elements_for_combos(&repository, &[]).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(repository.call_count(), 0);
    }
}
