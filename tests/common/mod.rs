#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A single-shot HTTP responder. Resolves to the raw request it received.
pub struct OneShotServer {
    pub base_url: String,
    pub request: JoinHandle<CapturedRequest>,
}

#[derive(Debug)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

pub async fn serve_once(status: &'static str, content_type: &'static str, body: impl Into<String>) -> OneShotServer {
    let body = body.into();
    serve_raw(format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ))
    .await
}

/// Reply with `response` verbatim, then close the connection.
pub async fn serve_raw(response: String) -> OneShotServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut sock).await;
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.ok();
        captured
    });

    OneShotServer {
        base_url: format!("http://{addr}/"),
        request,
    }
}

/// A port nothing is listening on.
pub async fn closed_port() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request(sock: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = sock.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let len = content_length(&head);
            if buf.len() >= end + 4 + len {
                let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + len]).to_string();
                return CapturedRequest { head, body };
            }
        }
    }
    CapturedRequest {
        head: String::from_utf8_lossy(&buf).to_string(),
        body: String::new(),
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|l| {
            let l = l.to_ascii_lowercase();
            l.strip_prefix("content-length:")
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(0)
}

/// Server-sent events body from a list of Gemini text chunks.
pub fn gemini_sse(chunks: &[&str]) -> String {
    let mut out = String::new();
    for c in chunks {
        let ev = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": c}]}}]
        });
        out.push_str(&format!("data: {ev}\r\n\r\n"));
    }
    out
}

/// Newline-delimited JSON body from a list of Ollama chat chunks.
pub fn ollama_ndjson(chunks: &[&str]) -> String {
    let mut out = String::new();
    for c in chunks {
        let line = serde_json::json!({"model": "llama3", "message": {"role": "assistant", "content": c}, "done": false});
        out.push_str(&format!("{line}\n"));
    }
    let done = serde_json::json!({"model": "llama3", "message": {"role": "assistant", "content": ""}, "done": true});
    out.push_str(&format!("{done}\n"));
    out
}
