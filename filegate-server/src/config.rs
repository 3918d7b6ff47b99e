//! Configuration for the filegate server.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `FG__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `FG__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `FG__HTTP_ADDR=0.0.0.0:5051` sets the HTTP server address
//! - `FG__STORAGE__TYPE=supabase` selects the Supabase backend
//! - `FG__STORAGE__BUCKET=uploads` sets the bucket name
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:5051
//!
//! storage:
//!   type: supabase
//!   endpoint: https://project.supabase.co
//!   bucket: uploads
//!   key: service-role-key
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "FG__";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl std::ops::Deref for ConfigSecret {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Storage backend configuration.
///
/// The `type` field in YAML or `FG__STORAGE__TYPE` in environment variables determines which
/// variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage backend (type `"filesystem"`).
    ///
    /// Stores every file in one flat directory.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /tmp/uploads
    /// ```
    FileSystem {
        /// Directory path for storing files.
        ///
        /// The directory will be created if it doesn't exist. Relative paths are resolved from
        /// the server's working directory.
        ///
        /// # Default
        ///
        /// `"/tmp/uploads"`
        ///
        /// # Environment Variables
        ///
        /// - `FG__STORAGE__TYPE=filesystem`
        /// - `FG__STORAGE__PATH=/path/to/storage`
        path: PathBuf,
    },

    /// Supabase object storage backend (type `"supabase"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: supabase
    ///   endpoint: https://project.supabase.co
    ///   bucket: uploads
    ///   key: service-role-key
    /// ```
    Supabase {
        /// Project URL, without the `/storage/v1` suffix.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__ENDPOINT`
        endpoint: String,

        /// Name of the storage bucket. The bucket must already exist.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__BUCKET`
        bucket: String,

        /// API key sent as bearer token and `apikey` header.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__KEY`
        key: SecretBox<ConfigSecret>,
    },

    /// Backblaze B2 storage backend (type `"backblaze"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: backblaze
    ///   bucket: uploads
    ///   key_id: 0012345
    ///   application_key: K001abcdef
    /// ```
    Backblaze {
        /// Optional override for the account authorization endpoint.
        ///
        /// # Default
        ///
        /// `https://api.backblazeb2.com`
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__ENDPOINT` (optional)
        endpoint: Option<String>,

        /// Name of the bucket. The bucket must already exist.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__BUCKET`
        bucket: String,

        /// Application key id.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__KEY_ID`
        key_id: String,

        /// Application key.
        ///
        /// # Environment Variable
        ///
        /// `FG__STORAGE__APPLICATION_KEY`
        application_key: SecretBox<ConfigSecret>,
    },
}

/// Upload handling.
///
/// Used in: [`Config::upload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Upload {
    /// Prefix stored names with the upload time in seconds since the Unix epoch.
    ///
    /// When enabled, uploading `notes.txt` stores `1700000000_notes.txt`, so repeated uploads of
    /// the same filename do not overwrite each other.
    ///
    /// # Default
    ///
    /// `false`
    ///
    /// # Environment Variable
    ///
    /// `FG__UPLOAD__TIMESTAMP_PREFIX`
    pub timestamp_prefix: bool,

    /// Maximum size of an upload request body in bytes.
    ///
    /// Larger requests are rejected with `413 Payload Too Large`.
    ///
    /// # Default
    ///
    /// `104857600` (100 MiB)
    ///
    /// # Environment Variable
    ///
    /// `FG__UPLOAD__MAX_SIZE`
    pub max_size: usize,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            timestamp_prefix: false,
            max_size: 100 * 1024 * 1024,
        }
    }
}

/// Configuration for the [`StorageService`](filegate_service::StorageService).
///
/// Used in: [`Config::service`]
///
/// # Environment Variables
///
/// - `FG__SERVICE__BACKEND_TIMEOUT`
/// - `FG__SERVICE__MAX_CONCURRENCY`
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Service {
    /// Maximum duration of a single backend operation, e.g. `30s` or `2m`.
    ///
    /// Operations exceeding it fail with `500 Internal Server Error`.
    ///
    /// # Default
    ///
    /// [`DEFAULT_BACKEND_TIMEOUT`](filegate_service::DEFAULT_BACKEND_TIMEOUT)
    #[serde(with = "humantime_serde")]
    pub backend_timeout: Duration,

    /// Maximum number of concurrent backend operations.
    ///
    /// Operations that exceed the limit are rejected immediately.
    ///
    /// # Default
    ///
    /// [`DEFAULT_CONCURRENCY_LIMIT`](filegate_service::DEFAULT_CONCURRENCY_LIMIT)
    pub max_concurrency: usize,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            backend_timeout: filegate_service::DEFAULT_BACKEND_TIMEOUT,
            max_concurrency: filegate_service::DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `FG__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Sentry {
    /// Sentry DSN. When `None`, Sentry integration is completely disabled.
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, e.g. `production`.
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Server name or identifier, usually the hostname or pod name.
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__SERVER_NAME`
    pub server_name: Option<Cow<'static, str>>,

    /// Error event sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0` (send all errors)
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__SAMPLE_RATE`
    pub sample_rate: f32,

    /// Performance trace sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `0.01` (send 1% of traces)
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__TRACES_SAMPLE_RATE`
    pub traces_sample_rate: f32,

    /// Enable Sentry SDK debug output on stderr.
    ///
    /// # Default
    ///
    /// `false`
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__DEBUG`
    pub debug: bool,

    /// Additional tags to attach to all Sentry events.
    ///
    /// # Environment Variables
    ///
    /// Each tag is set individually:
    /// - `FG__SENTRY__TAGS__FOO=foo`
    /// - `FG__SENTRY__TAGS__BAR=bar`
    pub tags: BTreeMap<String, String>,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
            debug: false,
            tags: BTreeMap::new(),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2025-01-04T12:10:32Z  INFO filegate_server::web::server: HTTP server listening on 0.0.0.0:5051
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output: TRACE, DEBUG, INFO, WARN, ERROR or OFF.
    ///
    /// The `RUST_LOG` environment variable takes precedence when set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `FG__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `FG__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the filegate server.
///
/// See individual field documentation for defaults and environment variables.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:5051`
    ///
    /// # Environment Variable
    ///
    /// `FG__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// The storage backend serving all files. See [`Storage`] for available options.
    ///
    /// # Default
    ///
    /// Filesystem storage in `/tmp/uploads`
    pub storage: Storage,

    /// Upload handling. See [`Upload`].
    pub upload: Upload,

    /// Limits applied to backend operations. See [`Service`].
    pub service: Service,

    /// Configuration of the internal task runtime. See [`Runtime`].
    pub runtime: Runtime,

    /// Logging configuration. See [`Logging`].
    pub logging: Logging,

    /// Sentry error tracking configuration. See [`Sentry`].
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5051)),
            storage: Storage::FileSystem {
                path: PathBuf::from("/tmp/uploads"),
            },
            upload: Upload::default(),
            service: Service::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if a path is given)
    /// 3. Environment variables (prefixed with `FG__`)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if any value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
