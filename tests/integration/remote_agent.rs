//! Integration tests for the remote agent protocol

use std::time::Duration;

use pretty_assertions::assert_eq;
use reqwest::Client;
use serde_json::json;
use system_monitor::remote::{RemoteResponse, fetch_remote_metrics};
use system_monitor::storage::StorageBackend;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{remote_server, test_env};

#[tokio::test]
async fn test_agent_document_is_relayed_verbatim() {
    let agent = MockServer::start().await;
    let document = json!({
        "cpu": {"percent": 3.5, "freq": "2400.00Mhz", "temp_c": null, "temp_f": null},
        "memory": {"total": "8.00GB", "available": "6.00GB", "used": "2.00GB", "percent": 25.0},
        "disk": [],
        "connections": null
    });
    Mock::given(method("GET"))
        .and(path("/api/metrics"))
        .and(header("X-API-Key", "remote-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document.clone()))
        .mount(&agent)
        .await;

    let env = test_env().await;
    let server = env
        .storage
        .insert_server(remote_server(agent.address().to_string()))
        .await
        .unwrap();

    let response = fetch_remote_metrics(
        &Client::new(),
        env.storage.as_ref(),
        &server,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, document);
    let server = env.storage.server(server.id).await.unwrap().unwrap();
    assert!(server.last_seen.is_some());
}

#[tokio::test]
async fn test_wrong_key_yields_generic_error() {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("X-API-Key", "another-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&agent)
        .await;

    let env = test_env().await;
    let server = env
        .storage
        .insert_server(remote_server(agent.address().to_string()))
        .await
        .unwrap();

    let response = fetch_remote_metrics(
        &Client::new(),
        env.storage.as_ref(),
        &server,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(response, RemoteResponse::failure());
}

#[tokio::test]
async fn test_unreachable_agent_yields_generic_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let env = test_env().await;
    let server = env
        .storage
        .insert_server(remote_server(address.to_string()))
        .await
        .unwrap();

    let response = fetch_remote_metrics(
        &Client::new(),
        env.storage.as_ref(),
        &server,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(response.status, 500);
    assert_eq!(
        response.body["error"],
        "Failed to fetch metrics from remote server"
    );
}
