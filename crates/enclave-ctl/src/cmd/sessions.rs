//! Agent session commands.

use anyhow::{Context, Result};

use enclave_core::wire::{AgentStatus, SessionList, SessionState, UploadResponse};

use super::http::{base_url, get_bytes, get_json, post_bytes, read_file};

/// At most the first 16 characters of `id`.
fn short(id: &str) -> &str {
    match id.char_indices().nth(16) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: AgentStatus = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Agent Status");
    println!("═══════════════════════════════════════");
    println!("  Sessions : {}", resp.sessions);
    println!("  Marker   : {}", resp.marker);

    Ok(())
}

pub async fn cmd_sessions(port: u16) -> Result<()> {
    let resp: SessionList = get_json(&format!("{}/sessions", base_url(port))).await?;

    if resp.sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Sessions ({})", resp.sessions.len());
    println!("═══════════════════════════════════════");
    for s in &resp.sessions {
        println!("  {}  {}", short(&s.session_id), s.state);
    }

    Ok(())
}

async fn upload(port: u16, session: &str, kind: &str, path: &str) -> Result<()> {
    let body = read_file(path)?;
    let len = body.len();
    let resp: UploadResponse = post_bytes(
        &format!("{}/sessions/{}/{}", base_url(port), session, kind),
        body,
        "application/octet-stream",
    )
    .await?;
    println!("Staged {} ({} bytes) as {}", path, len, short(&resp.id));
    Ok(())
}

pub async fn cmd_algo(port: u16, session: &str, path: &str) -> Result<()> {
    upload(port, session, "algo", path).await
}

pub async fn cmd_data(port: u16, session: &str, path: &str) -> Result<()> {
    upload(port, session, "data", path).await
}

pub async fn cmd_result(port: u16, session: &str, out: Option<&str>) -> Result<()> {
    let artifact = get_bytes(&format!("{}/sessions/{}/result", base_url(port), session)).await?;

    match out {
        Some(path) => {
            std::fs::write(path, &artifact)
                .with_context(|| format!("failed to write {}", path))?;
            println!("Wrote {} bytes to {}", artifact.len(), path);
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&artifact)
                .context("failed to write artifact to stdout")?;
        }
    }

    Ok(())
}

pub async fn cmd_state(port: u16, session: &str) -> Result<()> {
    let resp: SessionState =
        get_json(&format!("{}/sessions/{}/state", base_url(port), session)).await?;
    println!("{}", resp.state);
    Ok(())
}
