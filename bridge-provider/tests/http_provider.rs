//! Runs the HTTP server in-process and reaches it through HTTP sessions.

use std::sync::Arc;

use bridge_provider::{Catalog, HttpServerOptions, spawn_http};
use bridge_session::{
    HttpEndpoint, ProviderEndpoint, Session, SessionConfig, SessionError, SubProtocol,
};
use serde_json::json;

async fn exercise(endpoint: ProviderEndpoint) -> String {
    let mut session = Session::open(&endpoint, SessionConfig::default())
        .await
        .unwrap();
    session.initialize().await.unwrap();
    assert_eq!(session.list_capabilities().await.unwrap().len(), 1);

    let report = session
        .invoke(
            "get_weather",
            json!({"location": "Lagos"}).as_object().cloned().unwrap(),
        )
        .await
        .unwrap();
    session.close().await.unwrap();
    report.text()
}

#[tokio::test]
async fn streamable_http_with_json_bodies() {
    let provider = Arc::new(Catalog::Weather.provider().unwrap());
    let server = spawn_http(
        provider,
        "127.0.0.1:0".parse().unwrap(),
        HttpServerOptions::default(),
    )
    .unwrap();

    let text = exercise(ProviderEndpoint::http(server.url())).await;
    assert_eq!(text, "The weather is sunny");
    assert_eq!(server.open_sessions(), 0);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn streamable_http_with_event_streams() {
    let provider = Arc::new(Catalog::Weather.provider().unwrap());
    let server = spawn_http(
        provider,
        "127.0.0.1:0".parse().unwrap(),
        HttpServerOptions::default().with_event_stream(true),
    )
    .unwrap();

    let text = exercise(ProviderEndpoint::http(server.url())).await;
    assert_eq!(text, "The weather is sunny");
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn plain_http_sub_protocol() {
    let provider = Arc::new(Catalog::Weather.provider().unwrap());
    let server = spawn_http(
        provider,
        "127.0.0.1:0".parse().unwrap(),
        HttpServerOptions::default().with_event_stream(true),
    )
    .unwrap();

    let endpoint = HttpEndpoint::new(server.url()).sub_protocol(SubProtocol::Http);
    let text = exercise(endpoint.into()).await;
    assert_eq!(text, "The weather is sunny");
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn wrong_path_is_a_transport_error() {
    let provider = Arc::new(Catalog::Weather.provider().unwrap());
    let server = spawn_http(
        provider,
        "127.0.0.1:0".parse().unwrap(),
        HttpServerOptions::default(),
    )
    .unwrap();

    let url = format!("http://{}/elsewhere", server.local_addr());
    let mut session = Session::open(&ProviderEndpoint::http(url), SessionConfig::default())
        .await
        .unwrap();
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::Transport { .. }));
    server.shutdown().await.unwrap();
}
