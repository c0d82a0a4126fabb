//! Object store collaborator for media attachments.
//!
//! The core never holds attachment bytes: it hands a blob to the object
//! store and keeps only the returned URL string in the message record.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Accepts a binary blob plus logical path, returns a retrievable URL.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String>;
}

/// In-memory object store handing back `mem://` URLs. Test double and
/// single-process fallback.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(url)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| CoreError::NotFound(format!("object {url}")))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> Result<String> {
        let url = format!("mem://{path}");
        debug!("[Objects] Stored {} ({}, {} bytes)", url, content_type, data.len());
        self.objects
            .write()
            .await
            .insert(url.clone(), (data, content_type.to_string()));
        Ok(url)
    }
}
