use std::sync::Arc;

use filegate_service::{ServiceOptions, StorageConfig, StorageService};
use secrecy::ExposeSecret;

use crate::config::{Config, Storage};

/// Shared reference to the filegate [service state](State).
pub type ServiceState = Arc<State>;

/// Reference to the gateway's shared resources.
///
/// This structure is created once during server startup and shared with all HTTP request
/// handlers. It owns the single storage backend client used for the lifetime of the process.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// The storage service instance.
    pub service: StorageService,
}

impl State {
    /// Connects the configured storage backend.
    pub async fn new(config: Config) -> anyhow::Result<ServiceState> {
        let options = ServiceOptions {
            backend_timeout: config.service.backend_timeout,
            max_concurrency: config.service.max_concurrency,
        };
        let service = StorageService::new(map_storage_config(&config.storage), options).await?;

        Ok(Arc::new(Self { config, service }))
    }
}

fn map_storage_config(config: &'_ Storage) -> StorageConfig<'_> {
    match config {
        Storage::FileSystem { path } => StorageConfig::FileSystem { path },
        Storage::Supabase {
            endpoint,
            bucket,
            key,
        } => StorageConfig::Supabase {
            endpoint,
            bucket,
            key: key.expose_secret().as_str(),
        },
        Storage::Backblaze {
            endpoint,
            bucket,
            key_id,
            application_key,
        } => StorageConfig::Backblaze {
            endpoint: endpoint.as_deref(),
            bucket,
            key_id,
            application_key: application_key.expose_secret().as_str(),
        },
    }
}
