//! Validated object names.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Maximum length of an object name in bytes.
///
/// This matches the file name limit of common filesystems and stays well below the key limits of
/// the object storage providers.
pub const MAX_NAME_LENGTH: usize = 255;

/// Error returned when a string is not a valid [`ObjectName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNameError {
    /// The name is empty, or nothing remained after sanitizing a filename.
    #[error("object name must not be empty")]
    Empty,
    /// The name is `.` or `..`.
    #[error("object name must not be a relative path reference")]
    Reserved,
    /// The name starts with a dot. Such files are hidden and never listed.
    #[error("object name must not start with a dot")]
    Hidden,
    /// The name contains a path separator or a control character.
    #[error("object name contains invalid character {0:?}")]
    InvalidCharacter(char),
    /// The name exceeds [`MAX_NAME_LENGTH`] bytes.
    #[error("object name exceeds {MAX_NAME_LENGTH} bytes")]
    TooLong,
}

/// The name under which an object is stored.
///
/// Object names are flat: they never contain path separators, so they map to exactly one file in
/// the filesystem backend and to exactly one key in object storage buckets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName(String);

impl ObjectName {
    /// Validates a name taken verbatim from a request, such as a URL path segment.
    ///
    /// Unlike [`sanitize`](Self::sanitize), this never rewrites the input.
    pub fn parse(name: &str) -> Result<Self, InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name == "." || name == ".." {
            return Err(InvalidNameError::Reserved);
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(InvalidNameError::TooLong);
        }
        if let Some(c) = name
            .chars()
            .find(|c| *c == '/' || *c == '\\' || c.is_control())
        {
            return Err(InvalidNameError::InvalidCharacter(c));
        }
        if name.starts_with('.') {
            return Err(InvalidNameError::Hidden);
        }

        Ok(Self(name.to_owned()))
    }

    /// Derives an object name from a client-supplied filename.
    ///
    /// Only the final path component is kept, control characters are dropped, and surrounding
    /// whitespace as well as leading dots are trimmed. Leading dots are removed so that uploads
    /// can never create hidden files.
    pub fn sanitize(filename: &str) -> Result<Self, InvalidNameError> {
        let base = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(filename);

        let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
        let cleaned = cleaned.trim().trim_start_matches('.').trim_start();

        Self::parse(cleaned)
    }

    /// Returns a new name with the given time prepended in seconds since the UNIX epoch.
    ///
    /// Example: `notes.txt` becomes `1700000000_notes.txt`.
    pub fn with_timestamp_prefix(&self, time: SystemTime) -> Result<Self, InvalidNameError> {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::parse(&format!("{secs}_{}", self.0))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
