//! Access-port adapters talking to real backends.

mod dhis2;

pub use dhis2::{create_dhis2_repository, Dhis2Config, Dhis2Credentials, Dhis2MetadataRepository};
