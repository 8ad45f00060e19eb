//! In-memory fixture repository implementing the metadata access port.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use explorer_interfaces::metadata::{
    FieldSelection, MetadataError, MetadataItem, MetadataList, MetadataQuery, MetadataRepository,
    MetadataResult, Pager, ResourceType,
};

/// One recorded port call, for interaction assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// A `get` call
    Get {
        /// Requested resource type
        resource_type: ResourceType,
        /// Requested id
        id: String,
        /// Rendered field selection
        fields: String,
    },
    /// A `list` call
    List {
        /// Listed resource type
        resource_type: ResourceType,
        /// Rendered filters, in query order
        filters: Vec<String>,
        /// Whether paging was enabled
        paging: bool,
        /// Requested page, when paged
        page: Option<u32>,
        /// Requested page size, when paged
        page_size: Option<u32>,
    },
}

/// Fixture-backed [`MetadataRepository`]. Items are stored per type in
/// insertion order; list filters walk the item's JSON by dotted path,
/// matching any element of arrays along the way. Field selections are
/// recorded but not applied: fixtures already hold exactly the shape a
/// test wants returned.
#[derive(Debug, Default)]
pub struct InMemoryMetadataRepository {
    items: Mutex<HashMap<ResourceType, Vec<MetadataItem>>>,
    calls: Mutex<Vec<RecordedCall>>,
    failure: Mutex<Option<MetadataError>>,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryMetadataRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixture item.
    pub fn insert(&self, item: MetadataItem) {
        self.items
            .lock()
            .unwrap()
            .entry(item.resource_type)
            .or_default()
            .push(item);
    }

    /// Makes every subsequent call fail with the given error.
    pub fn fail_with(&self, error: MetadataError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Delays every subsequent call, for cancellation tests.
    pub fn delay_responses(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn before_respond(&self) -> MetadataResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn get(
        &self,
        resource_type: ResourceType,
        id: &str,
        fields: &FieldSelection,
    ) -> MetadataResult<MetadataItem> {
        self.calls.lock().unwrap().push(RecordedCall::Get {
            resource_type,
            id: id.to_string(),
            fields: fields.to_string(),
        });
        self.before_respond().await?;

        self.items
            .lock()
            .unwrap()
            .get(&resource_type)
            .and_then(|items| items.iter().find(|item| item.id == id))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound { resource_type, id: id.to_string() })
    }

    async fn list(&self, query: &MetadataQuery) -> MetadataResult<MetadataList> {
        self.calls.lock().unwrap().push(RecordedCall::List {
            resource_type: query.resource_type,
            filters: query.filters.iter().map(|filter| filter.to_string()).collect(),
            paging: query.paging,
            page: query.page,
            page_size: query.page_size,
        });
        self.before_respond().await?;

        let matching: Vec<MetadataItem> = self
            .items
            .lock()
            .unwrap()
            .get(&query.resource_type)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| {
                        let value = item.to_value();
                        query.filters.iter().all(|filter| {
                            let path: Vec<&str> = filter.property.split('.').collect();
                            value_matches(&value, &path, &filter.value)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !query.paging {
            return Ok(MetadataList::new(matching));
        }

        let page = query.page.unwrap_or(1).max(1);
        let page_size = query.page_size.unwrap_or(50).max(1);
        let total = matching.len() as u32;
        let page_count = total.div_ceil(page_size);
        let start = ((page - 1) * page_size) as usize;
        let items = matching
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok(MetadataList::with_pager(
            items,
            Pager { page, page_size, page_count, total },
        ))
    }
}

/// Dotted-path equality walk. Arrays at any level match when any
/// element matches the remaining path.
fn value_matches(value: &Value, path: &[&str], expected: &str) -> bool {
    if let Value::Array(elements) = value {
        return elements.iter().any(|element| value_matches(element, path, expected));
    }
    match path.split_first() {
        None => match value {
            Value::String(actual) => actual == expected,
            Value::Number(actual) => actual.to_string() == expected,
            Value::Bool(actual) => actual.to_string() == expected,
            _ => false,
        },
        Some((head, rest)) => match value {
            Value::Object(object) => object
                .get(*head)
                .is_some_and(|child| value_matches(child, rest, expected)),
            _ => false,
        },
    }
}
