//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

/// Turn a non-2xx answer into an error carrying the server's message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("server answered {}: {}", status, body.trim())
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to {}, is the service running?", url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn get_bytes(url: &str) -> Result<Vec<u8>> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to {}, is the service running?", url))?;
    let bytes = check(resp)
        .await?
        .bytes()
        .await
        .context("failed to read response body")?;
    Ok(bytes.to_vec())
}

/// POST a raw body and decode the JSON answer.
pub async fn post_bytes<R: for<'de> Deserialize<'de>>(
    url: &str,
    body: Vec<u8>,
    content_type: &str,
) -> Result<R> {
    let resp = reqwest::Client::new()
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to {}, is the service running?", url))?;
    check(resp)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}

pub fn read_file(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read file: {}", path))
}
