//! SSE transport integration tests against a `wiremock` mock server.
//!
//! # wiremock body helpers
//!
//! Use `set_body_raw(bytes, mime)` for the event stream so that the
//! `Content-Type` is `text/event-stream` exactly; `set_body_string` would
//! force `text/plain`.

use std::time::Duration;

use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tandem_rpc::transport::{SseTransport, Transport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Mount a `GET /events` stream serving the given raw SSE body.
async fn mount_events(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

fn connect(server: &MockServer) -> SseTransport {
    let base = url::Url::parse(&format!("{}/", server.uri())).expect("valid url");
    SseTransport::connect(base).expect("connect failed")
}

/// Read frames until the stream ends or a short deadline fires.
async fn drain(transport: &SseTransport) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(Ok(Some(frame))) =
        tokio::time::timeout(Duration::from_millis(300), transport.read()).await
    {
        frames.push(frame);
    }
    frames
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Each `data:` event in the stream surfaces as one `read()` frame.
#[tokio::test]
async fn test_events_forwarded_to_read() {
    let server = MockServer::start().await;
    mount_events(
        &server,
        "data: {\"jsonrpc\":\"2.0\",\"result\":1,\"id\":1}\n\ndata: {\"jsonrpc\":\"2.0\",\"result\":2,\"id\":2}\n\n",
    )
    .await;

    let transport = connect(&server);
    let frames = drain(&transport).await;

    assert_eq!(frames.len(), 2);
    assert!(frames[0].contains("\"id\":1"));
    assert!(frames[1].contains("\"id\":2"));
}

/// Multi-line `data:` fields of one event are joined with newlines.
#[tokio::test]
async fn test_multiline_data_joined() {
    let server = MockServer::start().await;
    mount_events(&server, "data: first line\ndata: second line\n\n").await;

    let transport = connect(&server);
    let frames = drain(&transport).await;

    assert_eq!(frames, vec!["first line\nsecond line".to_string()]);
}

/// Comment lines and non-data fields are ignored; only the payload comes
/// through.
#[tokio::test]
async fn test_comments_and_other_fields_ignored() {
    let server = MockServer::start().await;
    mount_events(
        &server,
        ": keepalive\n\nevent: message\nid: 7\ndata: payload\n\n: another comment\n\n",
    )
    .await;

    let transport = connect(&server);
    let frames = drain(&transport).await;

    assert_eq!(frames, vec!["payload".to_string()]);
}

/// A final event with no trailing blank line is still flushed when the
/// stream ends.
#[tokio::test]
async fn test_trailing_event_flushed_at_stream_end() {
    let server = MockServer::start().await;
    mount_events(&server, "data: last one\n").await;

    let transport = connect(&server);
    let frames = drain(&transport).await;

    assert_eq!(frames, vec!["last one".to_string()]);
}

/// Once the event stream is exhausted, `read()` reports end-of-stream.
#[tokio::test]
async fn test_read_reports_end_of_stream() {
    let server = MockServer::start().await;
    mount_events(&server, "data: only\n\n").await;

    let transport = connect(&server);
    let first = tokio::time::timeout(Duration::from_secs(2), transport.read())
        .await
        .expect("read timed out")
        .expect("read failed");
    assert_eq!(first.as_deref(), Some("only"));

    let eos = tokio::time::timeout(Duration::from_secs(2), transport.read())
        .await
        .expect("read timed out")
        .expect("read failed");
    assert!(eos.is_none());
}

/// `write()` POSTs the frame verbatim to `/request` as JSON.
#[tokio::test]
async fn test_write_posts_to_request_endpoint() {
    let server = MockServer::start().await;
    mount_events(&server, "").await;

    let frame = r#"{"jsonrpc":"2.0","method":"listPrompts","id":1}"#;
    Mock::given(method("POST"))
        .and(path("/request"))
        .and(header("content-type", "application/json"))
        .and(body_string(frame))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let transport = connect(&server);
    transport
        .write(frame.to_string())
        .await
        .expect("write failed");
}

/// A non-2xx status from the POST endpoint surfaces as a write error.
#[tokio::test]
async fn test_write_error_on_http_failure() {
    let server = MockServer::start().await;
    mount_events(&server, "").await;

    Mock::given(method("POST"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let transport = connect(&server);
    let result = transport.write("{}".to_string()).await;
    assert!(result.is_err());
}

/// `close()` unblocks a pending `read()`.
#[tokio::test]
async fn test_close_unblocks_read() {
    let server = MockServer::start().await;
    // Never send any event; read() would otherwise wait on the long-lived
    // GET forever. wiremock delivers the (empty) body immediately though,
    // so delay it to keep the stream open.
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(Vec::new(), "text/event-stream")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let transport = std::sync::Arc::new(connect(&server));
    let pending = {
        let transport = std::sync::Arc::clone(&transport);
        tokio::spawn(async move { transport.read().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    transport.close().await.expect("close failed");

    let outcome = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("read stayed blocked after close")
        .expect("task panicked")
        .expect("read failed");
    assert!(outcome.is_none());
}
