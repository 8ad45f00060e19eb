//! Metadata access-port interfaces
//!
//! The engine never talks HTTP directly: it consumes a narrow
//! repository trait that can fetch one entity by id or list entities
//! with filters and optional paging. Field selections are modeled as a
//! typed tree and serialized by each adapter into whatever syntax its
//! backend expects (the DHIS2 bracket syntax for the remote adapter).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque stable entity identifier, unique within its resource type.
pub type Id = String;

/// Result type for metadata access-port operations
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors that can occur when talking to a metadata backend
#[derive(Error, Debug, Clone)]
pub enum MetadataError {
    /// Network/transport failure, non-2xx response or timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// The requested entity does not exist
    #[error("Entity not found: type={resource_type} id={id}")]
    NotFound {
        /// Resource type of the missing entity
        resource_type: ResourceType,
        /// Identifier that was requested
        id: Id,
    },

    /// The backend answered with a payload this crate cannot decode
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A resource name outside the closed set of supported types
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),
}

impl From<serde_json::Error> for MetadataError {
    fn from(error: serde_json::Error) -> Self {
        MetadataError::MalformedPayload(error.to_string())
    }
}

/// The closed set of metadata entity kinds this system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    /// Data elements
    DataElements,
    /// Data sets
    DataSets,
    /// Categories
    Categories,
    /// Category combos
    CategoryCombos,
    /// Category options
    CategoryOptions,
    /// Category option combos
    CategoryOptionCombos,
}

impl ResourceType {
    /// All supported resource types, in display order.
    pub const ALL: [ResourceType; 6] = [
        ResourceType::DataElements,
        ResourceType::DataSets,
        ResourceType::Categories,
        ResourceType::CategoryCombos,
        ResourceType::CategoryOptions,
        ResourceType::CategoryOptionCombos,
    ];

    /// API resource name, as it appears in URLs and node keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::DataElements => "dataElements",
            ResourceType::DataSets => "dataSets",
            ResourceType::Categories => "categories",
            ResourceType::CategoryCombos => "categoryCombos",
            ResourceType::CategoryOptions => "categoryOptions",
            ResourceType::CategoryOptionCombos => "categoryOptionCombos",
        }
    }

    /// Human-readable label for UI consumption.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceType::DataElements => "Data elements",
            ResourceType::DataSets => "Data sets",
            ResourceType::Categories => "Categories",
            ResourceType::CategoryCombos => "Category combos",
            ResourceType::CategoryOptions => "Category options",
            ResourceType::CategoryOptionCombos => "Category option combos",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = MetadataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| MetadataError::UnsupportedResourceType(value.to_string()))
    }
}

/// One field in a selection tree: a name plus optional nested fields
/// for relation expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Property name on the entity
    pub name: String,
    /// Nested selection for a relation; empty for scalar fields
    pub children: Vec<Field>,
}

impl Field {
    /// A scalar field.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self { name: name.into(), children: Vec::new() }
    }

    /// A relation field expanded with a nested selection.
    pub fn nested(name: impl Into<String>, children: Vec<Field>) -> Self {
        Self { name: name.into(), children }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.children.is_empty() {
            write!(f, "[{}]", join_fields(&self.children))
        } else {
            Ok(())
        }
    }
}

fn join_fields(fields: &[Field]) -> String {
    fields.iter().map(Field::to_string).collect::<Vec<_>>().join(",")
}

/// An ordered field selection, serialized by adapters into the
/// backend's comma-separated bracket syntax, e.g.
/// `id,displayName,categoryCombo[id,displayName]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection(pub Vec<Field>);

impl FieldSelection {
    /// Builds a selection from an ordered list of fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    /// The common `id,displayName` selection.
    pub fn named_ref() -> Self {
        Self(vec![Field::leaf("id"), Field::leaf("displayName")])
    }
}

impl fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_fields(&self.0))
    }
}

/// An equality/relation filter expression, e.g.
/// `categoryCombo.id:eq:abc`. Multiple filters on a query combine with
/// implicit AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Dotted property path on the listed entity
    pub property: String,
    /// Value the property (or any element of an array along the path)
    /// must equal
    pub value: String,
}

impl MetadataFilter {
    /// An equality filter on the given property path.
    pub fn eq(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self { property: property.into(), value: value.into() }
    }
}

impl fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:eq:{}", self.property, self.value)
    }
}

/// Parameters for the port's list operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataQuery {
    /// Resource type to list
    pub resource_type: ResourceType,
    /// Field selection applied to every returned item
    pub fields: FieldSelection,
    /// Filters combined with implicit AND
    pub filters: Vec<MetadataFilter>,
    /// 1-based page number; only meaningful when `paging` is true
    pub page: Option<u32>,
    /// Page size; only meaningful when `paging` is true
    pub page_size: Option<u32>,
    /// When false the port must return the complete result set
    pub paging: bool,
}

impl MetadataQuery {
    /// A fetch-all query (paging disabled; the backend must not apply
    /// an implicit page cap).
    pub fn unpaged(resource_type: ResourceType, fields: FieldSelection) -> Self {
        Self {
            resource_type,
            fields,
            filters: Vec::new(),
            page: None,
            page_size: None,
            paging: false,
        }
    }

    /// A paged query; the returned list must carry pager metadata.
    pub fn paged(
        resource_type: ResourceType,
        fields: FieldSelection,
        page: u32,
        page_size: u32,
    ) -> Self {
        Self {
            resource_type,
            fields,
            filters: Vec::new(),
            page: Some(page),
            page_size: Some(page_size),
            paging: true,
        }
    }

    /// Adds a filter to the query.
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// A metadata entity as returned by the access port. Beyond the
/// identity fields it carries whatever additional attributes the
/// requested field selection produced, as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataItem {
    /// Resource type the item belongs to
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Opaque stable identifier
    pub id: Id,
    /// Localized display name, when requested and present
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Raw name, when requested and present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Additional attributes from the field selection
    #[serde(flatten)]
    pub properties: serde_json::Map<String, Value>,
}

impl MetadataItem {
    /// Creates an item with no extra attributes.
    pub fn new(resource_type: ResourceType, id: impl Into<Id>) -> Self {
        Self {
            resource_type,
            id: id.into(),
            display_name: None,
            name: None,
            properties: serde_json::Map::new(),
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Attaches an arbitrary attribute.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Builds an item from a raw backend payload. The payload must be
    /// an object with a string `id`.
    pub fn from_value(resource_type: ResourceType, value: Value) -> MetadataResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(MetadataError::MalformedPayload(format!(
                "expected a JSON object for {resource_type}"
            )));
        };
        let id = match object.remove("id") {
            Some(Value::String(id)) => id,
            _ => {
                return Err(MetadataError::MalformedPayload(format!(
                    "missing string id on {resource_type} payload"
                )))
            }
        };
        let display_name = take_string(&mut object, "displayName");
        let name = take_string(&mut object, "name");
        Ok(Self { resource_type, id, display_name, name, properties: object })
    }

    /// Re-assembles the full JSON payload (identity fields plus
    /// attributes) for typed decoding.
    pub fn to_value(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(display_name) = &self.display_name {
            object.insert("displayName".to_string(), Value::String(display_name.clone()));
        }
        if let Some(name) = &self.name {
            object.insert("name".to_string(), Value::String(name.clone()));
        }
        for (key, value) in &self.properties {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Decodes the item into a typed projection.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> MetadataResult<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    /// Display name with fallback to `name`, then the id.
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

fn take_string(object: &mut serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

/// Pager metadata attached to paged list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    /// 1-based page number of this result
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Total number of pages
    pub page_count: u32,
    /// Total number of matching items
    pub total: u32,
}

/// An ordered sequence of items plus optional pager metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataList {
    /// Items in backend order
    pub items: Vec<MetadataItem>,
    /// Present when the query had paging enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pager: Option<Pager>,
}

impl MetadataList {
    /// An unpaged list.
    pub fn new(items: Vec<MetadataItem>) -> Self {
        Self { items, pager: None }
    }

    /// A paged list with pager metadata.
    pub fn with_pager(items: Vec<MetadataItem>, pager: Pager) -> Self {
        Self { items, pager: Some(pager) }
    }
}

/// The metadata access port: fetch one entity by id, or list entities
/// with filters and optional paging. Implemented by the remote DHIS2
/// adapter and by the in-memory fixture repository.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Fetches one entity by id with the given field selection.
    ///
    /// Contract: fails with [`MetadataError::NotFound`] when the id
    /// does not exist, and with [`MetadataError::Transport`] on any
    /// transport-level failure.
    async fn get(
        &self,
        resource_type: ResourceType,
        id: &str,
        fields: &FieldSelection,
    ) -> MetadataResult<MetadataItem>;

    /// Lists entities matching the query. With `paging: false` the
    /// complete result set is returned; with `paging: true` the result
    /// carries pager metadata reflecting total and page count.
    async fn list(&self, query: &MetadataQuery) -> MetadataResult<MetadataList>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_type_round_trip() {
        for resource_type in ResourceType::ALL {
            let parsed: ResourceType = resource_type.as_str().parse().unwrap();
            assert_eq!(parsed, resource_type);
        }
    }

    #[test]
    fn test_resource_type_unknown_name() {
        let error = "indicators".parse::<ResourceType>().unwrap_err();
        assert_eq!(format!("{}", error), "Unsupported resource type: indicators");
    }

    #[test]
    fn test_field_selection_bracket_syntax() {
        let fields = FieldSelection::new(vec![
            Field::leaf("id"),
            Field::leaf("displayName"),
            Field::nested(
                "categoryCombo",
                vec![
                    Field::leaf("id"),
                    Field::leaf("displayName"),
                    Field::nested(
                        "categories",
                        vec![Field::leaf("id"), Field::leaf("displayName")],
                    ),
                ],
            ),
        ]);
        assert_eq!(
            fields.to_string(),
            "id,displayName,categoryCombo[id,displayName,categories[id,displayName]]"
        );
    }

    #[test]
    fn test_filter_display() {
        let filter = MetadataFilter::eq("categoryCombo.id", "abc123");
        assert_eq!(filter.to_string(), "categoryCombo.id:eq:abc123");
    }

    #[test]
    fn test_item_from_value_splits_identity_fields() {
        let item = MetadataItem::from_value(
            ResourceType::DataElements,
            json!({
                "id": "DE1",
                "displayName": "Element 1",
                "categoryCombo": { "id": "CC1" }
            }),
        )
        .unwrap();

        assert_eq!(item.id, "DE1");
        assert_eq!(item.display_label(), "Element 1");
        assert_eq!(item.properties["categoryCombo"], json!({ "id": "CC1" }));
    }

    #[test]
    fn test_item_from_value_requires_id() {
        let error =
            MetadataItem::from_value(ResourceType::Categories, json!({ "displayName": "x" }))
                .unwrap_err();
        assert!(matches!(error, MetadataError::MalformedPayload(_)));
    }

    #[test]
    fn test_display_label_fallbacks() {
        let mut item = MetadataItem::new(ResourceType::Categories, "CAT1");
        assert_eq!(item.display_label(), "CAT1");
        item.name = Some("gender".to_string());
        assert_eq!(item.display_label(), "gender");
        item.display_name = Some("Gender".to_string());
        assert_eq!(item.display_label(), "Gender");
    }

    #[test]
    fn test_to_value_round_trip() {
        let item = MetadataItem::new(ResourceType::CategoryCombos, "CC1")
            .with_display_name("Combo 1")
            .with_property("categories", json!([{ "id": "CAT1" }]));
        let value = item.to_value();
        let rebuilt = MetadataItem::from_value(ResourceType::CategoryCombos, value).unwrap();
        assert_eq!(rebuilt, item);
    }
}
