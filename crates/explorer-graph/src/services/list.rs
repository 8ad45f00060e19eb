//! Flat metadata listing, for browse views outside the graph.

use std::sync::Arc;

use tracing::instrument;

use explorer_interfaces::metadata::{
    MetadataList, MetadataQuery, MetadataRepository, MetadataResult,
};

/// Lists metadata entities by passing the query through to the access
/// port unchanged.
pub struct ListMetadataService {
    repository: Arc<dyn MetadataRepository>,
}

impl ListMetadataService {
    /// Creates a listing service over the given access port.
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    /// Runs the query against the port.
    #[instrument(skip(self, query), fields(resource_type = %query.resource_type))]
    pub async fn execute(&self, query: &MetadataQuery) -> MetadataResult<MetadataList> {
        self.repository.list(query).await
    }
}
