//! Concurrency limiter for backend operations.
//!
//! [`ConcurrencyLimiter`] caps the number of in-flight backend operations using a tokio
//! semaphore. Permits are returned when the [`ConcurrencyPermit`] is dropped.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, ServiceError};

/// Limits concurrent backend operations and tracks the in-flight count.
#[derive(Clone, Debug)]
pub(crate) struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimiter {
    /// Creates a new limiter with the given maximum number of permits.
    pub(crate) fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Tries to acquire a concurrency permit.
    ///
    /// Returns [`ServiceError::AtCapacity`] when all permits are held.
    pub(crate) fn try_acquire(&self) -> Result<ConcurrencyPermit> {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| {
                tracing::warn!(max = self.max, "Backend concurrency limit reached");
                ServiceError::AtCapacity
            })?;

        Ok(ConcurrencyPermit { _permit: permit })
    }

    /// Returns the number of permits currently held.
    #[cfg(test)]
    pub(crate) fn used_permits(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }
}

/// RAII guard for a concurrency permit.
#[derive(Debug)]
pub(crate) struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
}
