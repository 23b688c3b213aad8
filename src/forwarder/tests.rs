//! Forwarder tests against a mock HTTP server

use std::time::Duration;

use test_case::test_case;
use wiremock::matchers::{basic_auth, body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn forwarder_with(config: BridgeConfig) -> (HttpForwarder, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let forwarder = HttpForwarder::new(&config, metrics.clone()).unwrap();
    (forwarder, metrics)
}

fn forwarder() -> (HttpForwarder, Arc<Metrics>) {
    forwarder_with(BridgeConfig::default())
}

#[test]
fn test_destination_url_substitutes_first_placeholder_only() {
    assert_eq!(
        destination_url("http://sink/{topic}", "a/b"),
        "http://sink/a/b"
    );
    assert_eq!(
        destination_url("http://sink/{topic}?copy={topic}", "t"),
        "http://sink/t?copy={topic}"
    );
    assert_eq!(destination_url("http://sink/fixed", "t"), "http://sink/fixed");
}

#[test_case(200, true ; "ok grants")]
#[test_case(201, true ; "created grants")]
#[test_case(204, false ; "no content denies")]
#[test_case(401, false ; "unauthorized denies")]
#[test_case(403, false ; "forbidden denies")]
#[test_case(500, false ; "server error denies")]
#[tokio::test]
async fn test_authorize_status(status: u16, granted: bool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;

    let (forwarder, metrics) = forwarder();
    let url = format!("{}/auth", server.uri());
    let result = forwarder.authorize(&url, "alice", "secret").await;

    assert_eq!(result.is_ok(), granted);
    if !granted {
        assert!(
            matches!(result, Err(ForwardError::Status { code, .. }) if code == status),
            "denial should carry the status code"
        );
    }
    let code = status.to_string();
    assert_eq!(
        metrics
            .authenticate_total
            .with_label_values(&[url.as_str(), code.as_str()])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_authorize_sends_basic_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(basic_auth("alice", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let (forwarder, _) = forwarder();
    assert!(forwarder
        .authorize(&server.uri(), "alice", "secret")
        .await
        .is_ok());
    assert!(forwarder
        .authorize(&server.uri(), "alice", "wrong")
        .await
        .is_err());
}

#[tokio::test]
async fn test_authorize_unreachable_is_transport_error() {
    let (forwarder, metrics) = forwarder();
    let url = "http://127.0.0.1:1/auth";

    let result = forwarder.authorize(url, "alice", "secret").await;

    assert!(matches!(result, Err(ForwardError::Transport { .. })));
    assert_eq!(
        metrics
            .authenticate_total
            .with_label_values(&[url, TRANSPORT_FAILURE])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_authorize_invalid_url() {
    let (forwarder, metrics) = forwarder();

    let result = forwarder.authorize("not a url", "alice", "secret").await;

    assert!(matches!(result, Err(ForwardError::InvalidUrl { .. })));
    assert_eq!(
        metrics
            .authenticate_total
            .with_label_values(&["not a url", TRANSPORT_FAILURE])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_authorize_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (forwarder, _) = forwarder_with(BridgeConfig {
        timeout: Duration::from_millis(200),
        ..BridgeConfig::default()
    });

    let started = std::time::Instant::now();
    let result = forwarder.authorize(&server.uri(), "alice", "secret").await;

    assert!(matches!(result, Err(ForwardError::Transport { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_forward_posts_payload_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest/devices/42/state"))
        .and(header("content-type", "application/json"))
        .and(header("x-topic", "devices/42/state"))
        .and(body_bytes(br#"{"hello":"world"}"#.to_vec()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (forwarder, metrics) = forwarder_with(BridgeConfig {
        content_type: "application/json".to_string(),
        ..BridgeConfig::default()
    });
    let template = format!("{}/ingest/{{topic}}", server.uri());

    forwarder
        .forward(
            &template,
            "devices/42/state",
            Bytes::from_static(br#"{"hello":"world"}"#),
        )
        .await
        .unwrap();

    assert_eq!(
        metrics
            .forward_total
            .with_label_values(&[template.as_str(), "204"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_forward_omits_empty_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (forwarder, _) = forwarder_with(BridgeConfig {
        content_type: String::new(),
        topic_header: String::new(),
        ..BridgeConfig::default()
    });

    forwarder
        .forward(&server.uri(), "t", Bytes::from_static(b"x"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("content-type"));
    assert!(!requests[0].headers.contains_key("x-topic"));
}

#[tokio::test]
async fn test_forward_non_2xx_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (forwarder, metrics) = forwarder();
    let result = forwarder
        .forward(&server.uri(), "t", Bytes::from_static(b"x"))
        .await;

    assert!(matches!(result, Err(ForwardError::Status { code: 502, .. })));
    assert_eq!(
        metrics
            .forward_total
            .with_label_values(&[server.uri().as_str(), "502"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_forward_unreachable_counts_transport_failure() {
    let (forwarder, metrics) = forwarder();
    let template = "http://127.0.0.1:1/{topic}";

    let result = forwarder
        .forward(template, "a/b", Bytes::from_static(b"x"))
        .await;

    assert!(matches!(result, Err(ForwardError::Transport { .. })));
    assert_eq!(
        metrics
            .forward_total
            .with_label_values(&[template, TRANSPORT_FAILURE])
            .get(),
        1
    );
}

#[test]
fn test_invalid_topic_header_rejected() {
    let config = BridgeConfig {
        topic_header: "X Topic".to_string(),
        ..BridgeConfig::default()
    };
    let result = HttpForwarder::new(&config, Arc::new(Metrics::new()));
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_error_display() {
    let err = ForwardError::Status {
        url: "http://auth".to_string(),
        code: 403,
    };
    assert_eq!(
        err.to_string(),
        "POST http://auth failed with status code 403"
    );
    assert_eq!(err.code_label(), "403");
}
