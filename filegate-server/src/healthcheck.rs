use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;

/// Upper bound for a single healthcheck request.
const HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes a server running with the same configuration.
///
/// Checks `/ready` when `ready` is set, which also fails while the server is draining. Otherwise
/// checks the `/health` liveness endpoint.
pub async fn healthcheck(config: Config, ready: bool) -> Result<()> {
    let endpoint = if ready { "ready" } else { "health" };
    let url = format!("http://{}/{endpoint}", config.http_addr);

    let client = reqwest::Client::builder()
        .timeout(HEALTHCHECK_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    tracing::debug!(%url, "Sending healthcheck request");
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("filegate is not reachable at {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{endpoint} check failed with status {status}");
    }

    tracing::info!(endpoint, "OK");
    Ok(())
}
