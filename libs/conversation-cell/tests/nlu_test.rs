use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::{HistoryTurn, HttpNluClient, NluClient, NluError};
use shared_config::AppConfig;
use shared_models::Direction;
use shared_utils::test_utils::TestConfig;

#[tokio::test]
async fn test_converse_sends_history_and_parses_proposal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/converse"))
        .and(header("authorization", "Bearer test-nlu-key"))
        .and(body_partial_json(json!({
            "currentMessage": "June 1st please",
            "history": [
                { "direction": "in", "text": "hi" },
                { "direction": "out", "text": "Which day?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "replyText": "Booking you in",
            "bookingProposal": {
                "name": "Ana",
                "reason": null,
                "city": "Oaxaca",
                "neighborhood": null,
                "eventHint": "Reforma",
                "date": "2025-06-01"
            },
            "metadata": { "step": "confirm" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_upstreams(&mock_server.uri()).to_app_config();
    let client = HttpNluClient::new(&config).unwrap();
    let history = vec![
        HistoryTurn { direction: Direction::In, text: "hi".to_string() },
        HistoryTurn { direction: Direction::Out, text: "Which day?".to_string() },
    ];

    let reply = client
        .converse("5215550001", "June 1st please", &history, &json!({}))
        .await
        .unwrap();

    let proposal = reply.booking_proposal.unwrap();
    assert_eq!(proposal.event_hint, "Reforma");
    assert_eq!(proposal.date, "2025-06-01");
    assert_eq!(reply.metadata, Some(json!({ "step": "confirm" })));
}

#[tokio::test]
async fn test_server_error_is_an_upstream_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/converse"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_upstreams(&mock_server.uri()).to_app_config();
    let client = HttpNluClient::new(&config).unwrap();

    let result = client.converse("5215550001", "hi", &[], &json!({})).await;
    assert_matches!(result, Err(NluError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_garbage_reply_is_a_decode_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_upstreams(&mock_server.uri()).to_app_config();
    let client = HttpNluClient::new(&config).unwrap();

    let result = client.converse("5215550001", "hi", &[], &json!({})).await;
    assert_matches!(result, Err(NluError::Decode(_)));
}

#[tokio::test]
async fn test_slow_collaborator_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let config = AppConfig {
        upstream_timeout_seconds: 1,
        ..TestConfig::with_upstreams(&mock_server.uri()).to_app_config()
    };
    let client = HttpNluClient::new(&config).unwrap();

    let result = client.converse("5215550001", "hi", &[], &json!({})).await;
    assert_matches!(result, Err(NluError::Timeout(1)));
}
