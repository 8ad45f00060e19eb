//! Application services: the graph assembly engine, lazy option-combo
//! paging, and flat listing.

mod fanout;
mod graph_service;
mod list;
mod option_combos;
mod views;

pub use graph_service::MetadataGraphService;
pub use list::ListMetadataService;
pub use option_combos::{CategoryOptionComboPager, OptionComboPageRequest};
