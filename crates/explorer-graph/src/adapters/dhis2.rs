use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use explorer_interfaces::metadata::{
    FieldSelection, MetadataError, MetadataItem, MetadataList, MetadataQuery, MetadataRepository,
    MetadataResult, Pager, ResourceType,
};

/// Basic-auth credentials for the DHIS2 web API.
#[derive(Debug, Clone)]
pub struct Dhis2Credentials {
    /// Account username
    pub username: String,
    /// Account password
    pub password: String,
}

/// Configuration for the DHIS2 metadata repository
#[derive(Debug, Clone)]
pub struct Dhis2Config {
    /// Base URL of the DHIS2 instance, without the `/api` suffix
    pub base_url: String,
    /// Timeout in seconds for HTTP requests
    pub timeout_secs: u64,
    /// Optional basic-auth credentials
    pub credentials: Option<Dhis2Credentials>,
}

impl Default for Dhis2Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            credentials: None,
        }
    }
}

/// [`MetadataRepository`] backed by the DHIS2 web API.
///
/// Field selections render into the API's bracket syntax, filters into
/// repeated `filter=` parameters. `paging=false` queries return the
/// complete result set; paged queries surface the API's pager block.
#[derive(Debug, Clone)]
pub struct Dhis2MetadataRepository {
    config: Dhis2Config,
    client: Client,
}

impl Dhis2MetadataRepository {
    /// Creates a repository with the provided configuration
    pub fn new(config: Dhis2Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Creates a repository against the given base URL with defaults
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(Dhis2Config { base_url: base_url.into(), ..Dhis2Config::default() })
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.config.credentials {
            Some(credentials) => {
                request.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => request,
        }
    }

    /// Maps an HTTP error to a MetadataError
    fn map_http_error(&self, error: reqwest::Error) -> MetadataError {
        if error.is_timeout() {
            MetadataError::Transport(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            MetadataError::Transport(format!("Connection error: {}", error))
        } else {
            MetadataError::Transport(format!("HTTP error: {}", error))
        }
    }
}

#[async_trait]
impl MetadataRepository for Dhis2MetadataRepository {
    #[instrument(skip(self, fields))]
    async fn get(
        &self,
        resource_type: ResourceType,
        id: &str,
        fields: &FieldSelection,
    ) -> MetadataResult<MetadataItem> {
        debug!("Fetching {} {}", resource_type, id);

        let url = format!("{}/api/{}/{}", self.config.base_url, resource_type, id);
        let response = self
            .request(&url)
            .query(&[("fields", fields.to_string())])
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                Err(MetadataError::NotFound { resource_type, id: id.to_string() })
            }
            status if status.is_success() => {
                let payload: Value = response.json().await.map_err(|e| {
                    MetadataError::MalformedPayload(format!("Failed to parse response: {}", e))
                })?;
                MetadataItem::from_value(resource_type, payload)
            }
            status => {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP error: {}", status));
                Err(MetadataError::Transport(error_body))
            }
        }
    }

    #[instrument(skip(self, query), fields(resource_type = %query.resource_type))]
    async fn list(&self, query: &MetadataQuery) -> MetadataResult<MetadataList> {
        debug!("Listing {} with {} filter(s)", query.resource_type, query.filters.len());

        let url = format!("{}/api/{}", self.config.base_url, query.resource_type);
        let mut params: Vec<(&str, String)> = vec![("fields", query.fields.to_string())];
        for filter in &query.filters {
            params.push(("filter", filter.to_string()));
        }
        params.push(("paging", query.paging.to_string()));
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(page_size) = query.page_size {
            params.push(("pageSize", page_size.to_string()));
        }

        let response = self
            .request(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        match response.status() {
            status if status.is_success() => {
                let mut payload: Value = response.json().await.map_err(|e| {
                    MetadataError::MalformedPayload(format!("Failed to parse response: {}", e))
                })?;

                let pager = match payload.get_mut("pager").map(Value::take) {
                    Some(value) if !value.is_null() => {
                        Some(serde_json::from_value::<Pager>(value)?)
                    }
                    _ => None,
                };
                let items = match payload.get_mut(query.resource_type.as_str()).map(Value::take) {
                    Some(Value::Array(values)) => values
                        .into_iter()
                        .map(|value| MetadataItem::from_value(query.resource_type, value))
                        .collect::<MetadataResult<Vec<_>>>()?,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(MetadataError::MalformedPayload(format!(
                            "expected an array under {}",
                            query.resource_type
                        )))
                    }
                };

                Ok(MetadataList { items, pager })
            }
            status => {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP error: {}", status));
                Err(MetadataError::Transport(error_body))
            }
        }
    }
}

/// Creates a MetadataRepository implementation from a configuration
pub fn create_dhis2_repository(config: Dhis2Config) -> Arc<dyn MetadataRepository> {
    Arc::new(Dhis2MetadataRepository::new(config))
}
