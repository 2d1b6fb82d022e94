//! HTTP-level tests for the chat client against a mock backend.

use futures::StreamExt;
use wikichat_api::{Author, ChatBackend, ChatClient, ChatEntry, Endpoints, Error};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|data| format!("event: message\ndata: {}\n\n", data))
        .collect()
}

fn client_for(server: &MockServer) -> ChatClient {
    ChatClient::new(Endpoints::new(server.uri())).unwrap()
}

#[tokio::test]
async fn test_create_session_posts_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create_streaming_chat/"))
        .and(body_json(serde_json::json!([
            {"content": "What is the capital of France?", "author": "USER"}
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ack = client
        .create_session(&[ChatEntry::user("What is the capital of France?")])
        .await
        .unwrap();
    assert_eq!(ack.0, serde_json::json!({"success": true}));
}

#[tokio::test]
async fn test_create_session_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create_streaming_chat/"))
        .respond_with(ResponseTemplate::new(422).set_body_string("validation failed"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.create_session(&[ChatEntry::user("hi")]).await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("validation failed"), "got: {}", message);
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_session_unreachable() {
    // Nothing listens on the discard port.
    let client = ChatClient::new(Endpoints::new("http://127.0.0.1:9")).unwrap();
    let err = client.create_session(&[]).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "got: {:?}", err);
}

#[tokio::test]
async fn test_stream_yields_events_in_order() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"content": "Paris", "author": 0, "isTransient": true}"#,
        r#"{"content": "#,
        r#"{"content": "Paris is the capital of France.", "author": 0, "isStop": true}"#,
    ]);
    Mock::given(method("GET"))
        .and(path("/get_streaming_chat_response"))
        .respond_with(sse_response(&body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client.open_stream().await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.entry.content, "Paris");
    assert!(first.is_transient);

    let second = stream.next().await.unwrap().unwrap_err();
    assert!(second.is_decode(), "got: {:?}", second);

    let third = stream.next().await.unwrap().unwrap();
    assert_eq!(third.entry.author, Author::Agent);
    assert!(third.is_stop);

    // The body ends without a reconnect: one transport error, then nothing.
    let ended = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(ended, Error::Sse(_)), "got: {:?}", ended);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_rejected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_streaming_chat_response"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client.open_stream().await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Api { status: 500, .. }), "got: {:?}", err);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_session_cookie_reaches_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create_streaming_chat/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session_id=abc123; Path=/")
                .set_body_json(serde_json::json!({"success": true})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_streaming_chat_response"))
        .and(header("cookie", "session_id=abc123"))
        .respond_with(sse_response(&sse_body(&[
            r#"{"content": "done", "author": "AGENT", "isStop": true}"#,
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.create_session(&[ChatEntry::user("hi")]).await.unwrap();
    let mut stream = client.open_stream().await.unwrap();
    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.entry.content, "done");
}

#[tokio::test]
async fn test_ask_returns_reply_with_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query/What%20is%20the%20capital%20of%20France%3F"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "Paris.",
            "sources": ["Paris", "France"]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.ask("What is the capital of France?").await.unwrap();
    assert_eq!(reply.response, "Paris.");
    assert_eq!(reply.sources, vec!["Paris".to_string(), "France".to_string()]);
}

#[tokio::test]
async fn test_ask_malformed_reply() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.ask("Anything?").await.unwrap_err();
    assert!(matches!(err, Error::Json(_)), "got: {:?}", err);
    assert!(!err.is_retryable());
}
