//! Paged retrieval of category option combos for the lazy relation.

use std::sync::Arc;

use tracing::instrument;

use explorer_interfaces::metadata::{
    Field, FieldSelection, Id, MetadataFilter, MetadataList, MetadataQuery, MetadataRepository,
    MetadataResult, ResourceType,
};

/// One page request against a combo's option combos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionComboPageRequest {
    /// Combo whose option combos are paged
    pub category_combo_id: Id,
    /// 1-based page number
    pub page: u32,
    /// Page size
    pub page_size: u32,
}

/// Fetches pages of category option combos belonging to one category
/// combo. Used to resolve the lazy relation flagged on graphs whose
/// center has a combo; each returned page is merged via
/// [`crate::graph::MetadataGraph::merge_category_option_combos`].
pub struct CategoryOptionComboPager {
    repository: Arc<dyn MetadataRepository>,
}

impl CategoryOptionComboPager {
    /// Creates a pager over the given access port.
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    /// Fetches one page. The result carries pager metadata with total
    /// and page count.
    #[instrument(skip(self))]
    pub async fn execute(&self, request: &OptionComboPageRequest) -> MetadataResult<MetadataList> {
        let fields = FieldSelection::new(vec![
            Field::leaf("id"),
            Field::leaf("displayName"),
            Field::nested(
                "categoryCombo",
                vec![Field::leaf("id"), Field::leaf("displayName")],
            ),
        ]);
        let query = MetadataQuery::paged(
            ResourceType::CategoryOptionCombos,
            fields,
            request.page,
            request.page_size,
        )
        .with_filter(MetadataFilter::eq(
            "categoryCombo.id",
            &request.category_combo_id,
        ));
        self.repository.list(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryMetadataRepository;
    use explorer_interfaces::metadata::MetadataItem;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn option_combo(id: &str, combo_id: &str) -> MetadataItem {
        MetadataItem::from_value(
            ResourceType::CategoryOptionCombos,
            json!({
                "id": id,
                "displayName": format!("Coc {id}"),
                "categoryCombo": { "id": combo_id }
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pages_only_matching_option_combos() {
        let repository = Arc::new(InMemoryMetadataRepository::new());
        for i in 1..=5 {
            repository.insert(option_combo(&format!("COC{i}"), "CC1"));
        }
        repository.insert(option_combo("OTHER", "CC2"));
        let pager = CategoryOptionComboPager::new(
            Arc::clone(&repository) as Arc<dyn MetadataRepository>
        );

        let request = OptionComboPageRequest {
            category_combo_id: "CC1".to_string(),
            page: 2,
            page_size: 2,
        };
        let page = pager.execute(&request).await.unwrap();

        let ids: Vec<_> = page.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["COC3", "COC4"]);
        let meta = page.pager.unwrap();
        assert_eq!(meta.total, 5);
        assert_eq!(meta.page_count, 3);
        assert_eq!(meta.page, 2);
    }
}
