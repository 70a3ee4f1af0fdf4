use anyhow::{Context, Result};
use std::time::Duration;

pub(super) fn shutdown_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/shutdown")
}

/// Ask the worker's HTTP server to exit. Errors mean it is already gone.
pub(super) fn request_worker_shutdown(port: u16, timeout: Duration) -> Result<u16> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .context("failed to build shutdown client")?;
    let url = shutdown_url(port);
    let response = client
        .post(&url)
        .json(&serde_json::json!({}))
        .send()
        .with_context(|| format!("POST {url} failed"))?;
    Ok(response.status().as_u16())
}
