//! Computation descriptor: the job a manager hands to an agent.
//!
//! Every field is optional on the wire. The agent treats the descriptor as
//! opaque apart from echoing it back as the acknowledgment of `run`.

use serde::{Deserialize, Serialize};

/// Job descriptor: identity plus free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Computation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub owner: String,
    /// Unix seconds.
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub datasets: Vec<String>,
    pub algorithms: Vec<String>,
    pub dataset_providers: Vec<String>,
    pub algorithm_providers: Vec<String>,
    pub result_consumers: Vec<String>,
    /// Seconds the computation may live.
    pub ttl: u64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Computation {
    /// Parse a descriptor from raw JSON.
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Canonical acknowledgment: compact JSON with fields in declaration
    /// order and metadata keys sorted.
    pub fn ack(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Hex-encoded BLAKE3 digest of `bytes`. Used as the reference token for
/// staged algorithms and datasets.
pub fn content_id(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}
