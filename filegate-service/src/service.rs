//! Core storage service and configuration.
//!
//! This module contains [`StorageService`], the main entry point for storing and retrieving
//! objects, along with [`StorageConfig`] for backend initialization.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;

use crate::PayloadStream;
use crate::backend::backblaze::{self, BackblazeBackend};
use crate::backend::common::{BackendResult, BoxedBackend, DeleteOutcome, ObjectLocation};
use crate::backend::local_fs::LocalFs;
use crate::backend::supabase::SupabaseBackend;
use crate::concurrency::ConcurrencyLimiter;
use crate::error::{Result, ServiceError};
use crate::locks::NameLocks;
use crate::metadata::Metadata;
use crate::name::ObjectName;

/// Default maximum number of concurrent backend operations.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 500;

/// Default timeout for a single backend operation.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration to initialize a [`StorageService`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use a local directory as the storage backend.
    FileSystem {
        /// The path to the directory where files will be stored.
        path: &'a Path,
    },
    /// Use a Supabase storage bucket.
    Supabase {
        /// The project URL, e.g. `https://<project>.supabase.co`.
        endpoint: &'a str,
        /// The name of the bucket to use.
        bucket: &'a str,
        /// The API key used to authenticate requests.
        key: &'a str,
    },
    /// Use a Backblaze B2 bucket.
    Backblaze {
        /// Optional endpoint for account authorization.
        ///
        /// Defaults to `https://api.backblazeb2.com`.
        endpoint: Option<&'a str>,
        /// The name of the bucket to use.
        bucket: &'a str,
        /// The application key id.
        key_id: &'a str,
        /// The application key.
        application_key: &'a str,
    },
}

/// Runtime limits applied to all backend operations.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Maximum duration of a single backend call.
    ///
    /// For reads, this covers the time until the backend starts streaming the payload.
    pub backend_timeout: Duration,
    /// Maximum number of backend operations in flight at the same time.
    pub max_concurrency: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            max_concurrency: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

/// High-level asynchronous service for storing and retrieving objects.
///
/// The service owns a single backend client for the lifetime of the process and is cheap to
/// clone. Writes and deletes of the same object name are serialized within this process, so the
/// last completed operation determines the stored state. Operations on different names run fully
/// concurrently.
#[derive(Clone, Debug)]
pub struct StorageService(Arc<StorageServiceInner>);

#[derive(Debug)]
struct StorageServiceInner {
    backend: BoxedBackend,
    options: ServiceOptions,
    limiter: ConcurrencyLimiter,
    locks: NameLocks,
}

impl StorageService {
    /// Creates a new `StorageService` with the specified configuration.
    pub async fn new(config: StorageConfig<'_>, options: ServiceOptions) -> Result<Self> {
        let backend = create_backend(config).await?;
        Ok(Self::from_backend(backend, options))
    }

    fn from_backend(backend: BoxedBackend, options: ServiceOptions) -> Self {
        tracing::info!(backend = backend.name(), "Initialized storage backend");

        let inner = StorageServiceInner {
            backend,
            limiter: ConcurrencyLimiter::new(options.max_concurrency),
            options,
            locks: NameLocks::new(),
        };
        Self(Arc::new(inner))
    }

    /// Returns the name of the configured backend.
    pub fn backend_name(&self) -> &'static str {
        self.0.backend.name()
    }

    /// Stores or overwrites an object under the given name.
    pub async fn put_object(
        &self,
        name: &ObjectName,
        metadata: &Metadata,
        contents: Bytes,
    ) -> Result<ObjectLocation> {
        let _guard = self.0.locks.lock(name.as_str()).await;
        let backend = &self.0.backend;
        self.run("put", backend.put_object(name, metadata, contents)).await
    }

    /// Lists the names of all stored objects in ascending order.
    pub async fn list_objects(&self) -> Result<Vec<String>> {
        let mut names = self.run("list", self.0.backend.list_objects()).await?;
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Streams the contents of an object, if it exists.
    pub async fn get_object(
        &self,
        name: &ObjectName,
    ) -> Result<Option<(Metadata, PayloadStream)>> {
        self.run("get", self.0.backend.get_object(name)).await
    }

    /// Deletes an object, reporting whether it existed.
    pub async fn delete_object(&self, name: &ObjectName) -> Result<DeleteOutcome> {
        let _guard = self.0.locks.lock(name.as_str()).await;
        self.run("delete", self.0.backend.delete_object(name)).await
    }

    /// Returns the provider URL of an object, if the backend exposes one.
    ///
    /// This does not check whether the object exists.
    pub async fn object_url(&self, name: &ObjectName) -> Result<Option<String>> {
        self.run("url", self.0.backend.object_url(name)).await
    }

    /// Runs a backend operation under a concurrency permit and the configured timeout.
    async fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let _permit = self.0.limiter.try_acquire()?;

        match tokio::time::timeout(self.0.options.backend_timeout, future).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => {
                tracing::warn!(operation, "Backend operation timed out");
                Err(ServiceError::Timeout { operation })
            }
        }
    }
}

async fn create_backend(config: StorageConfig<'_>) -> BackendResult<BoxedBackend> {
    let backend: BoxedBackend = match config {
        StorageConfig::FileSystem { path } => Box::new(LocalFs::new(path).await?),
        StorageConfig::Supabase {
            endpoint,
            bucket,
            key,
        } => Box::new(SupabaseBackend::new(
            endpoint,
            bucket,
            SecretString::from(key.to_owned()),
        )?),
        StorageConfig::Backblaze {
            endpoint,
            bucket,
            key_id,
            application_key,
        } => Box::new(BackblazeBackend::new(
            endpoint.unwrap_or(backblaze::DEFAULT_ENDPOINT),
            bucket,
            key_id,
            SecretString::from(application_key.to_owned()),
        )?),
    };

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures_util::TryStreamExt;

    use super::*;
    use crate::backend::in_memory::InMemoryBackend;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn make_service(backend: InMemoryBackend, options: ServiceOptions) -> StorageService {
        StorageService::from_backend(Box::new(backend), options)
    }

    async fn read_all(service: &StorageService, key: &str) -> Option<Vec<u8>> {
        let (_metadata, stream) = service.get_object(&name(key)).await.unwrap()?;
        let contents: BytesMut = stream.try_collect().await.unwrap();
        Some(contents.to_vec())
    }

    #[tokio::test]
    async fn stores_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let config = StorageConfig::FileSystem {
            path: tempdir.path(),
        };
        let service = StorageService::new(config, ServiceOptions::default())
            .await
            .unwrap();
        assert_eq!(service.backend_name(), "local-fs");

        let location = service
            .put_object(&name("the_file"), &Metadata::default(), "oh hai!".into())
            .await
            .unwrap();
        assert_eq!(location, ObjectLocation::Path(tempdir.path().join("the_file")));

        assert_eq!(read_all(&service, "the_file").await.unwrap(), b"oh hai!");
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let backend = InMemoryBackend::new();
        let service = make_service(backend.clone(), ServiceOptions::default());

        let metadata = Metadata::with_content_type("text/markdown");
        service
            .put_object(&name("notes.txt"), &metadata, "hello".into())
            .await
            .unwrap();

        let (stored_metadata, stored) = backend.get_stored("notes.txt").unwrap();
        assert_eq!(stored_metadata, metadata);
        assert_eq!(stored.as_ref(), b"hello");

        assert_eq!(service.list_objects().await.unwrap(), vec!["notes.txt"]);
        assert_eq!(read_all(&service, "notes.txt").await.unwrap(), b"hello");

        let outcome = service.delete_object(&name("notes.txt")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(backend.is_empty());

        let outcome = service.delete_object(&name("notes.txt")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert!(read_all(&service, "notes.txt").await.is_none());
    }

    #[tokio::test]
    async fn lists_sorted() {
        let service = make_service(InMemoryBackend::new(), ServiceOptions::default());
        for key in ["c", "a", "b"] {
            service
                .put_object(&name(key), &Metadata::default(), Bytes::new())
                .await
                .unwrap();
        }

        assert_eq!(service.list_objects().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_calls_time_out() {
        let backend = InMemoryBackend::new().with_delay(Duration::from_secs(10));
        let options = ServiceOptions {
            backend_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let service = make_service(backend.clone(), options);

        let result = service.list_objects().await;
        assert!(matches!(
            result,
            Err(ServiceError::Timeout { operation: "list" })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_operations_at_capacity() {
        let backend = InMemoryBackend::new().with_delay(Duration::from_secs(1));
        let options = ServiceOptions {
            max_concurrency: 1,
            ..Default::default()
        };
        let service = make_service(backend, options);

        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.list_objects().await }
        });
        // Let the spawned task acquire the only permit.
        tokio::task::yield_now().await;

        let result = service.get_object(&name("a")).await;
        assert!(matches!(result, Err(ServiceError::AtCapacity)));

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn serializes_writes_to_the_same_name() {
        let backend = InMemoryBackend::new().with_delay(Duration::from_millis(100));
        let service = make_service(backend.clone(), ServiceOptions::default());

        let first = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .put_object(&name("same"), &Metadata::default(), "first".into())
                    .await
            }
        });
        tokio::task::yield_now().await;

        // The delete has to wait for the upload that started earlier.
        let outcome = service.delete_object(&name("same")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);

        first.await.unwrap().unwrap();
        assert!(backend.is_empty());
    }
}
