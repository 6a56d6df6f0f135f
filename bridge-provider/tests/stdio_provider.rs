//! Spawns the provider binary and talks to it through real sessions.

use bridge_session::{ProviderEndpoint, Session, SessionConfig, SessionError, SessionState};
use serde_json::{Map, Value, json};

const PROVIDER: &str = env!("CARGO_BIN_EXE_capability-provider");

fn endpoint(catalog: &str) -> ProviderEndpoint {
    ProviderEndpoint::stdio(PROVIDER, ["--catalog", catalog])
}

fn arguments(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn math_over_stdio() {
    let mut session = Session::open(&endpoint("math"), SessionConfig::default())
        .await
        .unwrap();
    session.initialize().await.unwrap();
    assert_eq!(session.provider().unwrap().name(), "Math");

    let names: Vec<String> = session
        .list_capabilities()
        .await
        .unwrap()
        .iter()
        .map(|capability| capability.name().to_string())
        .collect();
    assert_eq!(names, ["add", "multiply"]);

    let sum = session
        .invoke("add", arguments(json!({"a": 10, "b": 8})))
        .await
        .unwrap();
    assert!(!sum.is_error());
    assert_eq!(sum.text(), "18");

    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn bmi_domain_error_is_a_tool_result() {
    let mut session = Session::open(&endpoint("bmi"), SessionConfig::default())
        .await
        .unwrap();
    session.initialize().await.unwrap();

    let ok = session
        .invoke(
            "calculate_bmi",
            arguments(json!({"weight_kg": 70, "height_m": 1.75})),
        )
        .await
        .unwrap();
    assert_eq!(ok.text(), "22.86");

    let failed = session
        .invoke(
            "calculate_bmi",
            arguments(json!({"weight_kg": -1, "height_m": 1.75})),
        )
        .await
        .unwrap();
    assert!(failed.is_error());

    session.close().await.unwrap();
}

#[tokio::test]
async fn paginated_listing_is_merged() {
    let endpoint = ProviderEndpoint::stdio(PROVIDER, ["--catalog", "math", "--page-size", "1"]);
    let mut session = Session::open(&endpoint, SessionConfig::default())
        .await
        .unwrap();
    session.initialize().await.unwrap();
    assert_eq!(session.list_capabilities().await.unwrap().len(), 2);
    session.close().await.unwrap();
}

#[tokio::test]
async fn unknown_catalog_exits_and_session_fails() {
    let mut session = Session::open(&endpoint("astrology"), SessionConfig::default())
        .await
        .unwrap();
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport { .. } | SessionError::Protocol { .. }
    ));
    assert_eq!(session.state(), SessionState::Closed);
}
