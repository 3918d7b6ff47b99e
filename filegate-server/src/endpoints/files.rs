use std::time::SystemTime;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing;
use axum::{Json, Router};
use bytes::BytesMut;
use filegate_service::{DeleteOutcome, Metadata, ObjectLocation, ObjectName};
use futures_util::TryStreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::ServiceState;

/// Name of the multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

/// Content type for downloads of objects stored without one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters left unencoded in download paths: RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Characters left unencoded in RFC 5987 extended header parameters (`attr-char`).
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

pub fn router(max_upload_size: usize) -> Router<ServiceState> {
    let upload_routes = routing::post(upload).layer(DefaultBodyLimit::max(max_upload_size));

    Router::new()
        .route("/upload", upload_routes.clone())
        .route("/logs", upload_routes)
        .route("/files", routing::get(list))
        .route("/files/{name}", routing::get(url))
        .route("/view/{name}", routing::get(view))
        .route("/download/{name}", routing::get(download))
        .route("/delete/{name}", routing::delete(delete))
}

/// Response returned after storing an upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl UploadResponse {
    fn new(name: ObjectName, location: ObjectLocation) -> Self {
        let (path, url) = match location {
            ObjectLocation::Path(path) => (Some(path.display().to_string()), None),
            ObjectLocation::Url(url) => (None, Some(url)),
        };
        let target = path.as_deref().or(url.as_deref()).unwrap_or_default();

        Self {
            status: "success".to_owned(),
            message: format!("Saved to {target}"),
            filename: name.into_string(),
            path,
            url,
        }
    }
}

/// Response returned when resolving the URL of a file.
#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Response returned after deleting a file.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub filename: String,
}

async fn upload(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "upload without multipart body");
        ApiError::BadRequest("No file part".to_owned())
    })?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A "file" field without a filename is a plain form value, not a file part.
        let Some(filename) = field.file_name() else {
            continue;
        };
        if filename.is_empty() {
            return Err(ApiError::BadRequest("No selected file".to_owned()));
        }

        let mut name = ObjectName::sanitize(filename)?;
        if state.config.upload.timestamp_prefix {
            name = name.with_timestamp_prefix(SystemTime::now())?;
        }

        let metadata = Metadata {
            content_type: field.content_type().map(str::to_owned),
        };
        let contents = field.bytes().await?;
        let size = contents.len();

        let location = state.service.put_object(&name, &metadata, contents).await?;
        tracing::info!(%name, size, "Stored upload");

        return Ok(Json(UploadResponse::new(name, location)));
    }

    Err(ApiError::BadRequest("No file part".to_owned()))
}

async fn list(State(state): State<ServiceState>) -> ApiResult<Json<Vec<String>>> {
    let names = state.service.list_objects().await?;
    Ok(Json(names))
}

async fn url(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> ApiResult<Json<UrlResponse>> {
    let name = ObjectName::parse(&name)?;

    let url = match state.service.object_url(&name).await? {
        Some(url) => url,
        None => format!(
            "/download/{}",
            utf8_percent_encode(name.as_str(), PATH_SEGMENT)
        ),
    };

    Ok(Json(UrlResponse { url }))
}

async fn view(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> ApiResult<Html<String>> {
    let name = ObjectName::parse(&name)?;
    let Some((_metadata, stream)) = state.service.get_object(&name).await? else {
        return Err(ApiError::NotFound(name.into_string()));
    };

    let contents: BytesMut = stream.try_collect().await.map_err(ApiError::Stream)?;
    let text = String::from_utf8_lossy(&contents);

    Ok(Html(format!("<pre>{}</pre>", escape_html(&text))))
}

async fn download(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let name = ObjectName::parse(&name)?;
    let Some((metadata, stream)) = state.service.get_object(&name).await? else {
        return Err(ApiError::NotFound(name.into_string()));
    };

    let content_type = metadata
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or(HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, content_disposition(&name)),
    ];

    Ok((headers, Body::from_stream(stream)).into_response())
}

async fn delete(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let name = ObjectName::parse(&name)?;

    match state.service.delete_object(&name).await? {
        DeleteOutcome::Deleted => {
            tracing::info!(%name, "Deleted file");
            Ok(Json(DeleteResponse {
                status: "deleted".to_owned(),
                filename: name.into_string(),
            }))
        }
        DeleteOutcome::NotFound => Err(ApiError::NotFound(name.into_string())),
    }
}

/// Builds an attachment disposition for the name.
///
/// Non-ASCII names get an ASCII fallback in `filename` and the exact name in `filename*`.
fn content_disposition(name: &ObjectName) -> HeaderValue {
    let name = name.as_str();
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let escaped = fallback.replace('\\', "\\\\").replace('"', "\\\"");

    let mut value = format!("attachment; filename=\"{escaped}\"");
    if !name.is_ascii() {
        let encoded = utf8_percent_encode(name, ATTR_CHAR);
        value.push_str(&format!("; filename*=UTF-8''{encoded}"));
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#39;y&#39;&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain text\n"), "plain text\n");
    }

    #[test]
    fn quotes_disposition_filename() {
        let name = ObjectName::parse(r#"say "hi".txt"#).unwrap();
        assert_eq!(
            content_disposition(&name),
            r#"attachment; filename="say \"hi\".txt""#
        );

        let name = ObjectName::parse("grüße.txt").unwrap();
        assert_eq!(
            content_disposition(&name),
            "attachment; filename=\"gr__e.txt\"; filename*=UTF-8''gr%C3%BC%C3%9Fe.txt"
        );
    }

    #[test]
    fn upload_response_shapes() {
        let name = ObjectName::parse("a.txt").unwrap();
        let location = ObjectLocation::Path("/tmp/a.txt".into());
        let json = serde_json::to_value(UploadResponse::new(name.clone(), location)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "filename": "a.txt",
                "message": "Saved to /tmp/a.txt",
                "path": "/tmp/a.txt",
            })
        );

        let location = ObjectLocation::Url("https://cdn.example.com/a.txt".into());
        let json = serde_json::to_value(UploadResponse::new(name, location)).unwrap();
        assert_eq!(json["url"], "https://cdn.example.com/a.txt");
        assert!(json.get("path").is_none());
    }

    #[test]
    fn encodes_download_paths() {
        let encoded = utf8_percent_encode("my file #1.txt", PATH_SEGMENT).to_string();
        assert_eq!(encoded, "my%20file%20%231.txt");
    }
}
