//! One-off check of the health endpoint.

use anyhow::Result;
use reqwest::StatusCode;

use crate::config::Config;
use crate::http::HttpRemote;
use crate::request::{Check, Outcome, Request};

/// Requests `/health` on the configured host once and fails unless it answers `200 OK`.
pub async fn healthcheck(config: &Config) -> Result<()> {
    let remote = HttpRemote::new(&config.host, config.timeout)?;
    let request = Request::get("/health", "/health", Check::Status(StatusCode::OK));

    tracing::debug!("sending healthcheck request to {}", remote.host());
    if let Outcome::Failure(reason) = remote.execute(&request).await {
        anyhow::bail!("Healthcheck failed: {reason}");
    }

    tracing::info!("OK");
    Ok(())
}
