//! Client side of the agent contract, as seen by the manager.

use async_trait::async_trait;

use enclave_core::RunAck;

/// Where a guest's agent API is reachable from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub host: String,
    pub port: u16,
}

impl AgentEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/api", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("agent request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("agent at {url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("agent at {url} sent an unreadable response: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
pub trait RemoteAgent: Send + Sync {
    /// Hand `computation` to the agent at `endpoint`.
    async fn run(&self, endpoint: &AgentEndpoint, computation: &[u8]) -> Result<RunAck, RemoteError>;
}

/// Talks to the agent's HTTP API.
#[derive(Debug, Clone, Default)]
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RemoteAgent for HttpAgentClient {
    async fn run(&self, endpoint: &AgentEndpoint, computation: &[u8]) -> Result<RunAck, RemoteError> {
        let url = format!("{}/sessions", endpoint.base_url());
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(computation.to_vec())
            .send()
            .await
            .map_err(|source| RemoteError::Request {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<RunAck>()
            .await
            .map_err(|source| RemoteError::Decode { url, source })
    }
}
