//! Metadata service source

use super::{
    async_trait, MetadataSource, INSTANCE_METADATA_PATH, METADATA_SERVICE_URL,
    NETWORK_TOPOLOGY_PATH,
};
use crate::decode::{decode_instance_metadata, decode_network_topology};
use crate::error::{MetadataServiceError, SourceError};
use crate::models::ResolvedMetadata;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

/// Fetches metadata from the link-local metadata service
pub struct MetadataServiceSource {
    client: Client,
    base_url: String,
}

impl Default for MetadataServiceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataServiceSource {
    pub const NAME: &'static str = "metadata-service";

    pub fn new() -> Self {
        Self::with_base_url(METADATA_SERVICE_URL)
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, MetadataServiceError> {
        Url::parse(&self.base_url)
            .and_then(|base| base.join(path))
            .map_err(|source| MetadataServiceError::Url {
                url: format!("{}{}", self.base_url, path),
                source,
            })
    }

    /// GET `path` below the base URL; only 200 counts as success
    async fn get(&self, path: &str) -> Result<(Url, Vec<u8>), MetadataServiceError> {
        let url = self.url_for(path)?;
        debug!(url = %url, "Attempting to fetch metadata");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| MetadataServiceError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(url = %url, status = %status, "Unexpected status code when reading metadata");
            return Err(MetadataServiceError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| MetadataServiceError::Transport {
                url: url.to_string(),
                source,
            })?;

        Ok((url, body.to_vec()))
    }
}

#[async_trait]
impl MetadataSource for MetadataServiceSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(&self) -> Result<ResolvedMetadata, SourceError> {
        let (url, body) = self.get(INSTANCE_METADATA_PATH).await?;
        let instance = decode_instance_metadata(body.as_slice()).map_err(|source| {
            MetadataServiceError::Decode {
                url: url.to_string(),
                source,
            }
        })?;

        let network = match self.get(NETWORK_TOPOLOGY_PATH).await {
            Ok((url, body)) => match decode_network_topology(body.as_slice()) {
                Ok(topology) => Some(topology),
                Err(e) => {
                    debug!(url = %url, error = %e, "Can't parse network data");
                    None
                }
            },
            Err(e) => {
                debug!(error = %e, "Cannot read network data");
                None
            }
        };

        Ok(ResolvedMetadata::new(instance, network, Self::NAME))
    }
}
