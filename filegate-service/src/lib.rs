//! The service layer provides the storage abstraction behind the gateway.
//!
//! A [`StorageService`] owns exactly one long-lived backend, selected at startup through a
//! [`StorageConfig`]. The following backends are supported:
//!
//! - a flat directory on the local filesystem,
//! - a [Supabase](https://supabase.com/docs/guides/storage) storage bucket,
//! - a [Backblaze B2](https://www.backblaze.com/docs/cloud-storage-native-api) bucket.
//!
//! All backends address objects by their [`ObjectName`]. The service wraps every backend call in a
//! bounded timeout, serializes concurrent writes to the same name and caps the number of backend
//! operations in flight.
//!
//! It is designed as a library crate to be used by the `filegate-server`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod concurrency;
mod error;
mod locks;
mod metadata;
mod name;
mod service;

use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use backend::common::{DeleteOutcome, ObjectLocation};
pub use error::{Result, ServiceError};
pub use metadata::{DEFAULT_CONTENT_TYPE, Metadata};
pub use name::{InvalidNameError, MAX_NAME_LENGTH, ObjectName};
pub use service::{
    DEFAULT_BACKEND_TIMEOUT, DEFAULT_CONCURRENCY_LIMIT, ServiceOptions, StorageConfig,
    StorageService,
};

/// Type alias for data streams returned when reading objects.
pub type PayloadStream = BoxStream<'static, io::Result<Bytes>>;
