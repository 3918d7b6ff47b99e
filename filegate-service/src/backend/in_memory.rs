//! In-memory backend for tests.
//!
//! This provides a [`Backend`](super::common::Backend) backed by a `BTreeMap`, removing the need
//! for filesystem tempdir management in unit tests. The backend is [`Clone`] so tests can hold a
//! handle for direct inspection while the service owns a boxed copy.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use super::common::{Backend, BackendResult, DeleteOutcome, GetResponse, ObjectLocation};
use crate::metadata::Metadata;
use crate::name::ObjectName;

type Store = BTreeMap<String, (Metadata, Bytes)>;

#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
    delay: Option<Duration>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation sleep for the given duration before touching the store.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns a clone of the stored metadata and bytes, if present.
    pub fn get_stored(&self, name: &str) -> Option<(Metadata, Bytes)> {
        self.store.lock().unwrap().get(name).cloned()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(
        &self,
        name: &ObjectName,
        metadata: &Metadata,
        contents: Bytes,
    ) -> BackendResult<ObjectLocation> {
        self.wait().await;
        self.store
            .lock()
            .unwrap()
            .insert(name.to_string(), (metadata.clone(), contents));
        Ok(ObjectLocation::Url(format!("memory://{name}")))
    }

    async fn list_objects(&self) -> BackendResult<Vec<String>> {
        self.wait().await;
        Ok(self.store.lock().unwrap().keys().cloned().collect())
    }

    async fn get_object(&self, name: &ObjectName) -> BackendResult<GetResponse> {
        self.wait().await;
        let entry = self.store.lock().unwrap().get(name.as_str()).cloned();
        Ok(entry.map(|(metadata, bytes)| {
            let stream = futures_util::stream::once(async move { Ok(bytes) }).boxed();
            (metadata, stream)
        }))
    }

    async fn delete_object(&self, name: &ObjectName) -> BackendResult<DeleteOutcome> {
        self.wait().await;
        match self.store.lock().unwrap().remove(name.as_str()) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn object_url(&self, name: &ObjectName) -> BackendResult<Option<String>> {
        Ok(Some(format!("memory://{name}")))
    }
}
