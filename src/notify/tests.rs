//! Unit tests for notify module.

use super::*;
use crate::config::SecretString;
use crate::error::DeliveryErrorKind;
use crate::payload::{Attachment, Payload};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_payload(channel: &str, token: Option<&str>) -> Payload {
    Payload {
        channel: channel.to_string(),
        username: "fluentd".to_string(),
        icon_emoji: Some(":question:".to_string()),
        icon_url: None,
        token: token.map(|t| SecretString::new(t.to_string())),
        attachments: vec![Attachment {
            color: "good".to_string(),
            fallback: "boom\n".to_string(),
            text: Some("boom\n".to_string()),
            fields: None,
        }],
    }
}

fn make_client(timeout: Duration) -> reqwest::Client {
    build_http_client(&HttpSettings {
        open_timeout: Duration::from_secs(1),
        timeout,
        https_proxy: None,
    })
    .unwrap()
}

fn webhook_client(server: &MockServer) -> IncomingWebhookClient {
    IncomingWebhookClient::new(
        SecretString::new(format!("{}/services/T/B/X", server.uri())),
        make_client(Duration::from_secs(5)),
    )
}

fn web_api_client(server: &MockServer) -> WebApiClient {
    WebApiClient::new(
        SecretString::new("xoxb-test".to_string()),
        &format!("{}/api", server.uri()),
        make_client(Duration::from_secs(5)),
    )
}

// ===================================================================
// Incoming webhook
// ===================================================================

#[tokio::test]
async fn webhook_posts_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/T/B/X"))
        .and(body_partial_json(serde_json::json!({
            "channel": "#ops",
            "username": "fluentd",
            "icon_emoji": ":question:",
            "attachments": [{"color": "good", "fallback": "boom\n", "text": "boom\n"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = webhook_client(&server);
    client
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn webhook_non_success_status_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
        .mount(&server)
        .await;

    let err = webhook_client(&server)
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap_err();

    match &err {
        DeliveryError::Status { status, body } => {
            assert_eq!(*status, 404);
            assert_eq!(body, "no_service");
        }
        e => panic!("Expected Status error, got {:?}", e),
    }
    assert_eq!(err.kind(), DeliveryErrorKind::Permanent);
}

#[tokio::test]
async fn webhook_slow_response_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = IncomingWebhookClient::new(
        SecretString::new(server.uri()),
        make_client(Duration::from_millis(100)),
    );
    let err = client
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Timeout(_)), "{:?}", err);
    assert!(err.is_transient());
}

#[tokio::test]
async fn webhook_connection_refused_is_permanent() {
    let port = portpicker::pick_unused_port().expect("free port");
    let client = IncomingWebhookClient::new(
        SecretString::new(format!("http://127.0.0.1:{}/hook", port)),
        make_client(Duration::from_secs(1)),
    );

    let err = client
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), DeliveryErrorKind::Permanent, "{:?}", err);
}

// ===================================================================
// Web API
// ===================================================================

#[tokio::test]
async fn web_api_posts_form_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_string_contains("channel=%23ops"))
        .and(body_string_contains("token=xoxb-test"))
        .and(body_string_contains("icon_emoji=%3Aquestion%3A"))
        .and(body_string_contains("attachments="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    web_api_client(&server)
        .post_message(&make_payload("#ops", Some("xoxb-test")), &PostOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn web_api_error_response_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
        )
        .mount(&server)
        .await;

    let err = web_api_client(&server)
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, DeliveryError::Api("invalid_auth".to_string()));
    assert_eq!(err.kind(), DeliveryErrorKind::Permanent);
}

#[tokio::test]
async fn web_api_non_json_response_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = web_api_client(&server)
        .post_message(&make_payload("#ops", None), &PostOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.class(), "invalid_response");
}

#[tokio::test]
async fn web_api_creates_missing_channel_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": false, "error": "channel_not_found"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversations.create"))
        .and(body_string_contains("name=new-team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let options = PostOptions {
        auto_channels_create: true,
    };
    web_api_client(&server)
        .post_message(&make_payload("#new-team", None), &options)
        .await
        .unwrap();
}

#[tokio::test]
async fn web_api_missing_channel_without_auto_create_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": false, "error": "channel_not_found"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversations.create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let err = web_api_client(&server)
        .post_message(&make_payload("#nowhere", None), &PostOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, DeliveryError::Api("channel_not_found".to_string()));
}

#[test]
fn web_api_base_url_gets_trailing_slash() {
    let client = WebApiClient::new(
        SecretString::new("t".to_string()),
        "https://slack.example/api",
        reqwest::Client::new(),
    );
    assert_eq!(client.name(), "web_api");

    let client = IncomingWebhookClient::new(SecretString::new("u".to_string()), reqwest::Client::new());
    assert_eq!(client.name(), "webhook");
}

// ===================================================================
// Shared helpers
// ===================================================================

#[test]
fn client_from_transport_selects_implementation() {
    let http = reqwest::Client::new();
    let webhook = client_from_transport(
        &Transport::Webhook {
            url: SecretString::new("https://hooks.slack.com/services/T/B/X".to_string()),
        },
        http.clone(),
    );
    assert_eq!(webhook.name(), "webhook");

    let api = client_from_transport(
        &Transport::WebApi {
            token: SecretString::new("xoxb-1".to_string()),
            api_url: "https://slack.com/api/".to_string(),
        },
        http,
    );
    assert_eq!(api.name(), "web_api");
    assert!(!format!("{:?}", api).contains("xoxb"));
}

#[test]
fn build_http_client_rejects_invalid_proxy() {
    let result = build_http_client(&HttpSettings {
        open_timeout: Duration::from_secs(1),
        timeout: Duration::from_secs(1),
        https_proxy: Some("http://[bad".to_string()),
    });
    assert!(result.is_err());
}

#[test]
fn backoff_delay_calculation() {
    let base = Duration::from_millis(500);
    let max = Duration::from_secs(5);

    assert_eq!(backoff_delay(0, base, max), Duration::from_millis(500));
    assert_eq!(backoff_delay(1, base, max), Duration::from_millis(1000));
    assert_eq!(backoff_delay(2, base, max), Duration::from_millis(2000));
    assert_eq!(backoff_delay(3, base, max), Duration::from_millis(4000));
    assert_eq!(backoff_delay(4, base, max), Duration::from_secs(5));
    assert_eq!(backoff_delay(10, base, max), Duration::from_secs(5));
}

#[test]
fn backoff_delay_handles_overflow() {
    let base = Duration::from_secs(1);
    let max = Duration::from_secs(60);
    assert_eq!(backoff_delay(100, base, max), max);
}
