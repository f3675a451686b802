//! Client side of the remote agent protocol
//!
//! Live metrics of a non-local server are fetched from the agent running on
//! it: `GET http://{hostname}/api/metrics` with the server's key in the
//! `X-API-Key` header. The JSON body is relayed unchanged.

use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error, instrument, warn};

use crate::storage::{Server, StorageBackend};

pub const API_KEY_HEADER: &str = "X-API-Key";

pub const FETCH_ERROR: &str = "Failed to fetch metrics from remote server";

/// Status and JSON body to hand back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub fn failure() -> Self {
        Self {
            status: 500,
            body: json!({ "error": FETCH_ERROR }),
        }
    }
}

pub fn metrics_url(server: &Server) -> String {
    format!("http://{}/api/metrics", server.hostname)
}

async fn request_metrics(
    client: &Client,
    server: &Server,
    timeout: Duration,
) -> anyhow::Result<Value> {
    let response = client
        .get(metrics_url(server))
        .header(API_KEY_HEADER, &server.api_key)
        .timeout(timeout)
        .send()
        .await
        .context("request to agent failed")?;

    let status = response.status();
    if !status.is_success() {
        bail!("agent responded with status {status}");
    }

    response
        .json::<Value>()
        .await
        .context("agent returned an invalid JSON body")
}

/// Fetch the live metrics document of a remote server
///
/// Any failure yields a 500 with a generic error body. A successful fetch
/// also records the server as seen.
#[instrument(skip(client, storage, server), fields(server = %server.name))]
pub async fn fetch_remote_metrics(
    client: &Client,
    storage: &dyn StorageBackend,
    server: &Server,
    timeout: Duration,
) -> RemoteResponse {
    match request_metrics(client, server, timeout).await {
        Ok(body) => {
            if let Err(e) = storage.touch_server(server.id, Utc::now()).await {
                warn!("failed to update last_seen of server {}: {e}", server.id);
            }
            debug!("relayed remote metrics");
            RemoteResponse { status: 200, body }
        }
        Err(e) => {
            error!("Error fetching remote metrics from {}: {e:#}", server.hostname);
            RemoteResponse::failure()
        }
    }
}
