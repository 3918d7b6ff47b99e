use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

use crate::PayloadStream;
use crate::metadata::Metadata;
use crate::name::ObjectName;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("filegate/", env!("CARGO_PKG_VERSION"));

/// Timeout for establishing connections to remote storage providers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// Backend response for [`Backend::get_object`].
pub type GetResponse = Option<(Metadata, PayloadStream)>;

/// Where an object ended up after a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectLocation {
    /// The object was written to this path on the local filesystem.
    Path(PathBuf),
    /// The object is reachable at this URL.
    Url(String),
}

/// Outcome of [`Backend::delete_object`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and was removed.
    Deleted,
    /// There was no object with the given name.
    NotFound,
}

#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores an object under the given name, replacing any existing object.
    async fn put_object(
        &self,
        name: &ObjectName,
        metadata: &Metadata,
        contents: Bytes,
    ) -> BackendResult<ObjectLocation>;

    /// Lists the names of all stored objects.
    async fn list_objects(&self) -> BackendResult<Vec<String>>;

    /// Retrieves an object, returning its metadata and a stream of bytes.
    async fn get_object(&self, name: &ObjectName) -> BackendResult<GetResponse>;

    /// Deletes the object with the given name.
    async fn delete_object(&self, name: &ObjectName) -> BackendResult<DeleteOutcome>;

    /// Returns a URL under which the object can be fetched directly from the provider.
    ///
    /// Returns `None` if the backend has no notion of public URLs.
    async fn object_url(&self, name: &ObjectName) -> BackendResult<Option<String>>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to payload streaming or file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to de/serialization.
    #[error("serde error: {context}")]
    Serde {
        context: String,
        #[source]
        cause: serde_json::Error,
    },

    /// All errors stemming from the reqwest client.
    ///
    /// These are network errors encountered when sending requests or reading responses.
    #[error("reqwest error: {context}")]
    Reqwest {
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The storage provider answered with an unexpected status code.
    #[error("{context}: provider responded with {status}: {message}")]
    Api {
        context: String,
        status: StatusCode,
        message: String,
    },

    /// Any other error stemming from one of the storage backends, which might be specific to that
    /// backend or to a certain operation.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackendError {
    pub fn reqwest(context: impl fmt::Display, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.to_string(),
            cause,
        }
    }

    pub fn generic(context: impl fmt::Display) -> Self {
        Self::Generic {
            context: context.to_string(),
            cause: None,
        }
    }

    /// Returns `true` if the provider rejected the credentials of the request.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Creates a reqwest client with required defaults.
pub fn reqwest_client() -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|cause| BackendError::reqwest("building HTTP client", cause))
}

/// Converts a non-success response into a [`BackendError::Api`].
///
/// Successful responses are passed through unchanged.
pub async fn error_for_status(
    response: reqwest::Response,
    context: &str,
) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // The body is only used for diagnostics, so a failure to read it is not an error of its own.
    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Api {
        context: context.to_owned(),
        status,
        message,
    })
}

/// Reads a JSON body from a successful response.
pub async fn read_json<T>(response: reqwest::Response, context: &str) -> BackendResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = response
        .bytes()
        .await
        .map_err(|cause| BackendError::reqwest(context, cause))?;

    serde_json::from_slice(&bytes).map_err(|cause| BackendError::Serde {
        context: context.to_owned(),
        cause,
    })
}
