//! Backend for [Supabase Storage](https://supabase.com/docs/guides/storage).
//!
//! This talks to the storage REST API directly, authenticating every request with the project's
//! API key. Objects are stored at the root of a single bucket.

use std::io;

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use super::common::{
    Backend, BackendError, BackendResult, DeleteOutcome, GetResponse, ObjectLocation,
    error_for_status, read_json, reqwest_client,
};
use crate::metadata::Metadata;
use crate::name::ObjectName;

/// Number of entries requested per page when listing a bucket.
const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug)]
pub struct SupabaseBackend {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    key: SecretString,
}

impl SupabaseBackend {
    /// Creates a backend for the given project URL and bucket.
    ///
    /// The endpoint is the project URL, e.g. `https://<project>.supabase.co`.
    pub fn new(endpoint: &str, bucket: &str, key: SecretString) -> BackendResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|cause| BackendError::Generic {
            context: format!("invalid supabase endpoint `{endpoint}`"),
            cause: Some(Box::new(cause)),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::generic(format!(
                "supabase endpoint `{endpoint}` cannot be a base URL"
            )));
        }

        Ok(Self {
            client: reqwest_client()?,
            endpoint,
            bucket: bucket.to_owned(),
            key,
        })
    }

    /// Builds a URL below the storage API root from the given path segments.
    fn storage_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["storage", "v1"]).extend(segments);
        }
        url
    }

    fn public_url(&self, name: &ObjectName) -> String {
        self.storage_url(["object", "public", self.bucket.as_str(), name.as_str()])
            .into()
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let key = self.key.expose_secret();
        self.client
            .request(method, url)
            .bearer_auth(key)
            .header("apikey", key)
    }
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// Folders (common prefixes) are listed with a `null` id.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    prefixes: [&'a str; 1],
}

/// Checks whether an error body describes a missing object.
///
/// Depending on the version, the storage API reports missing objects either with a `404` status or
/// with a `400` status and `"statusCode": "404"` in the JSON body.
fn is_not_found_body(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };

    match value.get("statusCode") {
        Some(serde_json::Value::String(code)) => code == "404",
        Some(serde_json::Value::Number(code)) => code.as_u64() == Some(404),
        _ => value.get("error").and_then(|e| e.as_str()) == Some("not_found"),
    }
}

#[async_trait::async_trait]
impl Backend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn put_object(
        &self,
        name: &ObjectName,
        metadata: &Metadata,
        contents: Bytes,
    ) -> BackendResult<ObjectLocation> {
        tracing::debug!("Writing to supabase backend");
        let url = self.storage_url(["object", self.bucket.as_str(), name.as_str()]);

        let response = self
            .request(reqwest::Method::POST, url)
            .header(CONTENT_TYPE, metadata.content_type_or_default())
            .header("x-upsert", "true")
            .body(contents)
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("uploading object", cause))?;
        error_for_status(response, "uploading object").await?;

        Ok(ObjectLocation::Url(self.public_url(name)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn list_objects(&self) -> BackendResult<Vec<String>> {
        tracing::debug!("Listing supabase backend");
        let url = self.storage_url(["object", "list", self.bucket.as_str()]);
        let mut names = Vec::new();
        let mut offset = 0;

        loop {
            let request = ListRequest {
                prefix: "",
                limit: LIST_PAGE_SIZE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };

            let response = self
                .request(reqwest::Method::POST, url.clone())
                .json(&request)
                .send()
                .await
                .map_err(|cause| BackendError::reqwest("listing objects", cause))?;
            let response = error_for_status(response, "listing objects").await?;
            let page: Vec<ListEntry> = read_json(response, "listing objects").await?;

            let page_len = page.len();
            names.extend(
                page.into_iter()
                    .filter(|entry| entry.id.is_some())
                    .map(|entry| entry.name),
            );

            if page_len < LIST_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        names.sort();
        Ok(names)
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn get_object(&self, name: &ObjectName) -> BackendResult<GetResponse> {
        tracing::debug!("Reading from supabase backend");
        let url = self.storage_url(["object", self.bucket.as_str(), name.as_str()]);

        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("downloading object", cause))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!("Object not found");
                return Ok(None);
            }
            StatusCode::BAD_REQUEST => {
                let message = response.text().await.unwrap_or_default();
                if is_not_found_body(&message) {
                    tracing::debug!("Object not found");
                    return Ok(None);
                }
                return Err(BackendError::Api {
                    context: "downloading object".to_owned(),
                    status: StatusCode::BAD_REQUEST,
                    message,
                });
            }
            _ => {}
        }

        let response = error_for_status(response, "downloading object").await?;
        let metadata = Metadata {
            content_type: response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        };

        let stream = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(Some((metadata, stream)))
    }

    #[tracing::instrument(level = "trace", fields(%name), skip_all)]
    async fn delete_object(&self, name: &ObjectName) -> BackendResult<DeleteOutcome> {
        tracing::debug!("Deleting from supabase backend");
        let url = self.storage_url(["object", self.bucket.as_str()]);

        let response = self
            .request(reqwest::Method::DELETE, url)
            .json(&DeleteRequest {
                prefixes: [name.as_str()],
            })
            .send()
            .await
            .map_err(|cause| BackendError::reqwest("deleting object", cause))?;
        let response = error_for_status(response, "deleting object").await?;

        // The API responds with the list of objects that were actually removed.
        let deleted: Vec<serde_json::Value> = read_json(response, "deleting object").await?;
        if deleted.is_empty() {
            Ok(DeleteOutcome::NotFound)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn object_url(&self, name: &ObjectName) -> BackendResult<Option<String>> {
        Ok(Some(self.public_url(name)))
    }
}
