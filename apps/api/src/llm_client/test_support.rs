//! Shared fixtures for the llm_client tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::llm_client::provider::{ProviderClientManager, ProviderSettings};
use crate::llm_client::retry::RetryPolicy;

pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_jitter: Duration::ZERO,
    }
}

/// A manager pointed at `base_url`, with its credential stored under `key_env`.
/// Each test uses its own variable so tests can run in parallel.
pub fn manager_for(base_url: &str, key_env: &str) -> ProviderClientManager {
    std::env::set_var(key_env, "sk-test");
    ProviderClientManager::new(ProviderSettings {
        api_key_env: key_env.to_string(),
        base_url: base_url.to_string(),
        max_retries: 1,
        request_timeout: Duration::from_secs(5),
    })
}

/// A URL nothing is listening on.
pub fn connection_refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub async fn connection_refused() -> reqwest::Error {
    reqwest::Client::new()
        .get(connection_refused_url())
        .send()
        .await
        .unwrap_err()
}

/// A Messages API response body, in the provider's snake_case spelling.
pub fn message_response(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-5",
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 10, "output_tokens": 5}
    })
}

/// A proxy endpoint response body, already in the canonical camelCase shape.
pub fn proxy_result(text: &str) -> Value {
    json!({
        "id": "msg_proxy",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-5",
        "stopReason": "end_turn",
        "stopSequence": null,
        "usage": {"inputTokens": 8, "outputTokens": 4}
    })
}

/// A provider SSE transcript that emits one text delta per entry in `deltas`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    let mut event = |name: &str, data: Value| {
        body.push_str(&format!("event: {name}\ndata: {data}\n\n"));
    };

    event(
        "message_start",
        json!({"type": "message_start", "message": {"id": "msg_stream", "usage": {"input_tokens": 3, "output_tokens": 0}}}),
    );
    event(
        "content_block_start",
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    );
    for delta in deltas {
        event(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": delta}}),
        );
    }
    event("content_block_stop", json!({"type": "content_block_stop", "index": 0}));
    event(
        "message_delta",
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 7}}),
    );
    event("message_stop", json!({"type": "message_stop"}));
    body
}

/// An HTTP server that drops its first connection without answering and
/// serves `body` as JSON on every later one. Returns its base URL and a
/// counter of accepted connections.
pub async fn flaky_server(body: String) -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                drop(socket);
                continue;
            }
            let body = body.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), accepted)
}

/// Reads one request (headers plus a `content-length` body) off the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            return;
        }
    }
}
