/// Default content type for uploads that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Per-object attributes stored alongside the payload.
///
/// Backends that cannot persist metadata (such as the local filesystem) return the default value
/// on reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    /// The media type of the payload, if known.
    pub content_type: Option<String>,
}

impl Metadata {
    /// Creates metadata with the given content type.
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }

    /// Returns the content type, falling back to [`DEFAULT_CONTENT_TYPE`].
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}
