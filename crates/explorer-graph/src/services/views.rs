//! Typed projections of access-port payloads, decoded per builder.
//! These trust the shape returned by the port: absent relations decode
//! to `None`/empty rather than failing.

use serde::Deserialize;

use explorer_interfaces::metadata::Id;

/// Minimal entity reference: id plus optional display/raw name.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NamedRef {
    pub id: Id,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub name: Option<String>,
}

impl NamedRef {
    /// Display name with fallback to `name`, then the id.
    pub(crate) fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A category with its options expanded.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryView {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(rename = "categoryOptions", default)]
    pub category_options: Vec<NamedRef>,
}

/// A category combo expanded down to its categories' options.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryComboView {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(default)]
    pub categories: Vec<CategoryView>,
}

/// A data element with its default combo expanded.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataElementView {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(rename = "categoryCombo")]
    pub category_combo: Option<CategoryComboView>,
}

/// A category option combo with its combo and options.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryOptionComboView {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(rename = "categoryCombo")]
    pub category_combo: Option<NamedRef>,
    #[serde(rename = "categoryOptions", default)]
    pub category_options: Vec<NamedRef>,
}

/// The data element inside a data-set element, with its default combo.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataSetElementRef {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(rename = "categoryCombo")]
    pub category_combo: Option<NamedRef>,
}

/// One `dataSetElements` entry: a data element plus an optional
/// per-element combo assignment.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataSetElementView {
    #[serde(rename = "categoryCombo")]
    pub category_combo: Option<NamedRef>,
    #[serde(rename = "dataElement")]
    pub data_element: Option<DataSetElementRef>,
}

impl DataSetElementView {
    /// Whether this entry assigns a combo different from the element's
    /// own default combo (both must be present and non-equal).
    pub(crate) fn overrides_default_combo(&self) -> bool {
        match (
            self.category_combo.as_ref(),
            self.data_element
                .as_ref()
                .and_then(|element| element.category_combo.as_ref()),
        ) {
            (Some(assigned), Some(default)) => assigned.id != default.id,
            _ => false,
        }
    }
}

/// A data set with combo expansion and its data-set elements.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataSetView {
    #[serde(flatten)]
    pub named: NamedRef,
    #[serde(rename = "categoryCombo")]
    pub category_combo: Option<CategoryComboView>,
    #[serde(rename = "dataSetElements", default)]
    pub data_set_elements: Vec<DataSetElementView>,
}

impl DataSetView {
    /// A data set is an "override" data set when at least one of its
    /// entries assigns a non-default combo to its element.
    pub(crate) fn has_combo_override(&self) -> bool {
        self.data_set_elements
            .iter()
            .any(DataSetElementView::overrides_default_combo)
    }
}
