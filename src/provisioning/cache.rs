//! Remote metadata retrieval.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{SamlError, SamlResult};

/// Source of remote metadata documents referenced by URL.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Returns the metadata document published at `url`.
    async fn fetch(&self, url: &str, skip_ssl_validation: bool) -> SamlResult<String>;
}

/// Serves documents registered up front; any other URL fails.
#[derive(Debug, Default)]
pub struct StaticMetadataCache {
    documents: RwLock<HashMap<String, String>>,
}

impl StaticMetadataCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `xml` as the document at `url`.
    #[must_use]
    pub fn with_document(self, url: impl Into<String>, xml: impl Into<String>) -> Self {
        self.insert(url, xml);
        self
    }

    /// Registers or replaces the document at `url`.
    pub fn insert(&self, url: impl Into<String>, xml: impl Into<String>) {
        self.documents.write().insert(url.into(), xml.into());
    }
}

#[async_trait]
impl MetadataCache for StaticMetadataCache {
    async fn fetch(&self, url: &str, _skip_ssl_validation: bool) -> SamlResult<String> {
        debug!(%url, "serving cached metadata");
        self.documents
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| SamlError::Metadata(format!("no metadata available for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_registered_documents_only() {
        let cache = StaticMetadataCache::new().with_document("https://idp/metadata", "<md/>");
        assert_eq!(cache.fetch("https://idp/metadata", false).await.unwrap(), "<md/>");
        assert!(matches!(
            cache.fetch("https://other/metadata", false).await,
            Err(SamlError::Metadata(_))
        ));
    }
}
