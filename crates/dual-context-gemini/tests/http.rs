//! GeminiClient against a local one-shot HTTP server.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use dual_context_core::{ReasoningClient, ReasoningError, ReasoningRequest, Retryable};
use dual_context_gemini::{GeminiClient, GeminiConfig};

/// Serve exactly one canned response; the received request is sent back.
async fn serve_once(status_line: &str, extra_headers: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    );
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if request_complete(&received) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
    });

    (format!("http://{addr}/v1beta"), rx)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(split) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..split]
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= split + 4 + length
}

fn client(endpoint: &str) -> GeminiClient {
    GeminiClient::new(GeminiConfig::new("test-key", "gemini-test").with_endpoint(endpoint)).unwrap()
}

#[tokio::test]
async fn test_successful_call_returns_candidate_text() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"probability\":\"HIGH\",\"reasoning\":\"r\"}"}]}}]}"#;
    let (endpoint, request) = serve_once("200 OK", "", body).await;

    let text = client(&endpoint)
        .complete(&ReasoningRequest::new("find the bug"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(text.contains("\"probability\":\"HIGH\""));

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /v1beta/models/gemini-test:generateContent HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
    assert!(request.contains("\"text\":\"find the bug\""));
    assert!(request.contains("\"generationConfig\""));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (endpoint, _request) = serve_once(
        "429 Too Many Requests",
        "retry-after: 7\r\n",
        r#"{"error":{"message":"quota"}}"#,
    )
    .await;

    let err = client(&endpoint)
        .complete(&ReasoningRequest::new("p"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReasoningError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (endpoint, _request) = serve_once(
        "503 Service Unavailable",
        "",
        r#"{"error":{"message":"overloaded"}}"#,
    )
    .await;

    let err = client(&endpoint)
        .complete(&ReasoningRequest::new("p"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReasoningError::Server {
            status: 503,
            message: "overloaded".into()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bad_key_is_permanent() {
    let (endpoint, _request) = serve_once(
        "400 Bad Request",
        "",
        r#"{"error":{"code":400,"message":"API key not valid"}}"#,
    )
    .await;

    let err = client(&endpoint)
        .complete(&ReasoningRequest::new("p"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReasoningError::Client { status: 400, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_empty_candidates_is_empty_response() {
    let (endpoint, _request) = serve_once("200 OK", "", r#"{"candidates":[]}"#).await;

    let err = client(&endpoint)
        .complete(&ReasoningRequest::new("p"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, ReasoningError::EmptyResponse);
}

#[tokio::test]
async fn test_connection_refused_is_transient_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .complete(&ReasoningRequest::new("p"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReasoningError::Network(_)), "got {err:?}");
    assert!(err.is_retryable(), "got {err:?}");
}
