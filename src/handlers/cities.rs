//! `weather://cities` resource.

use crate::error::ResourceError;
use crate::handlers::CITIES;
use crate::protocol::{Resource, ResourceContents};
use crate::registry::ResourceReader;
use async_trait::async_trait;

pub const CITIES_URI: &str = "weather://cities";

pub fn resource() -> Resource {
    Resource::new(CITIES_URI, "Supported cities")
        .with_description("Cities with forecast coverage, as a JSON array")
        .with_mime_type("application/json")
}

pub struct CitiesResource;

#[async_trait]
impl ResourceReader for CitiesResource {
    async fn read(&self, uri: &str) -> Result<ResourceContents, ResourceError> {
        if uri != CITIES_URI {
            return Err(ResourceError::NotFound(uri.to_string()));
        }

        let body = serde_json::to_string_pretty(CITIES)
            .map_err(|e| ResourceError::Internal(e.to_string()))?;
        Ok(ResourceContents::text(uri, "application/json", body))
    }
}
