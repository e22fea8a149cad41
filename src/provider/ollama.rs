use super::{ChunkStream, GenerateFuture, Provider, TextChunk};
use crate::error::{GenerationError, Result};
use crate::prompt::AssembledPrompt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const HOST_ENV: &str = "OLLAMA_HOST";
pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";

const TEMPERATURE: f32 = 0.2;
const NUM_PREDICT: u32 = 8192;

/// A model served by a local Ollama daemon. No credential is needed.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    http: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaProvider {
    /// Host precedence: `host` argument, then `OLLAMA_HOST`, then
    /// [`DEFAULT_HOST`].
    pub fn new(http: reqwest::Client, host: Option<String>, model: impl Into<String>) -> Self {
        Self::with_env(http, host, model, |k| std::env::var(k).ok())
    }

    pub fn with_env(
        http: reqwest::Client,
        host: Option<String>,
        model: impl Into<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let host = host
            .filter(|h| !h.trim().is_empty())
            .or_else(|| env(HOST_ENV).filter(|h| !h.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = normalize_host(&host);
        let model = model.into();
        tracing::info!(event = "client_init", provider = "ollama", model_name = %model, host = %host, status = "success");
        Self { http, host, model }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

/// `localhost:11434` and `http://localhost:11434/` both become
/// `http://localhost:11434`.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: AssembledPrompt) -> GenerateFuture {
        let this = self.clone();

        Box::pin(async move {
            let body = ChatRequest::from_prompt(&this.model, &prompt);

            let resp = this
                .http
                .post(this.chat_url())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    GenerationError::failed(
                        anyhow::Error::new(e.without_url()).context(format!("failed to reach Ollama at {}", this.host)),
                    )
                })?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(GenerationError::GenerationFailed(format!(
                    "Ollama API error: HTTP {status}: {text}"
                )));
            }

            let (tx, rx) = mpsc::channel::<Result<TextChunk>>(64);

            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut decoder = NdjsonDecoder::default();

                while let Some(item) = stream.next().await {
                    let bytes = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx
                                .send(Err(GenerationError::transport("Ollama stream error", e)))
                                .await;
                            return;
                        }
                    };

                    for line in decoder.push(&bytes) {
                        match decode_line(&line) {
                            Ok(Step::Chunk(chunk)) => {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Step::Skip) => {}
                            Ok(Step::Done(last)) => {
                                if let Some(chunk) = last {
                                    let _ = tx.send(Ok(chunk)).await;
                                }
                                return;
                            }
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                }

                // A trailing line without a newline may still be the done marker.
                let tail = decoder.finish().map(|line| decode_line(&line)).transpose();
                let done = match tail {
                    Ok(Some(Step::Done(last))) => {
                        if let Some(chunk) = last {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                        true
                    }
                    Ok(Some(Step::Chunk(chunk))) => {
                        let _ = tx.send(Ok(chunk)).await;
                        false
                    }
                    Ok(_) => false,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if !done {
                    let _ = tx
                        .send(Err(GenerationError::GenerationFailed(
                            "Ollama stream ended before done".to_string(),
                        )))
                        .await;
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Chunk(TextChunk),
    Skip,
    /// `done: true`, with any content the final line still carries.
    Done(Option<TextChunk>),
}

fn decode_line(line: &str) -> Result<Step> {
    let parsed: ChatResponseLine = serde_json::from_str(line)
        .map_err(|e| GenerationError::GenerationFailed(format!("failed to parse Ollama JSON line: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(GenerationError::GenerationFailed(format!("Ollama error: {err}")));
    }

    let chunk = parsed
        .message
        .map(|m| m.content)
        .filter(|text| !text.is_empty())
        .map(|text| TextChunk { text });
    Ok(match (parsed.done, chunk) {
        (true, last) => Step::Done(last),
        (false, Some(chunk)) => Step::Chunk(chunk),
        (false, None) => Step::Skip,
    })
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
}

impl ChatRequest {
    /// Each prompt segment becomes its own user message, in order.
    fn from_prompt(model: &str, prompt: &AssembledPrompt) -> Self {
        Self {
            model: model.to_string(),
            stream: true,
            messages: prompt
                .segments()
                .into_iter()
                .map(|content| ChatMessage {
                    role: "user".to_string(),
                    content,
                })
                .collect(),
            options: ChatOptions {
                temperature: TEMPERATURE,
                num_predict: NUM_PREDICT,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseLine {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Splits a byte stream into newline-delimited lines, skipping blank ones.
#[derive(Debug, Default)]
struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if !line.is_empty() {
                out.push(line.to_string());
            }
        }
        out
    }

    fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buf);
        let tail = String::from_utf8_lossy(&tail);
        let tail = tail.trim();
        if tail.is_empty() { None } else { Some(tail.to_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptAssembler;

    #[test]
    fn host_defaults_and_env_override() {
        let http = reqwest::Client::new();
        let p = OllamaProvider::with_env(http.clone(), None, DEFAULT_MODEL, |_| None);
        assert_eq!(p.host(), DEFAULT_HOST);

        let p = OllamaProvider::with_env(http.clone(), None, DEFAULT_MODEL, |_| Some("10.0.0.2:11434".into()));
        assert_eq!(p.host(), "http://10.0.0.2:11434");

        let p = OllamaProvider::with_env(http, Some("https://box:1/".into()), DEFAULT_MODEL, |_| {
            Some("ignored:1".into())
        });
        assert_eq!(p.chat_url(), "https://box:1/api/chat");
    }

    #[test]
    fn request_has_one_message_per_segment() {
        let prompt = PromptAssembler::strict()
            .build::<&str>("demo", &[], "out.md", "Summarize")
            .unwrap();
        let body = serde_json::to_value(ChatRequest::from_prompt("llama3", &prompt)).unwrap();

        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], true);
        let contents: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(contents, prompt.segments());
        assert_eq!(body["options"]["num_predict"], 8192);
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut d = NdjsonDecoder::default();
        assert!(d.push(b"{\"a\":").is_empty());
        assert_eq!(d.push(b"1}\n\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(d.push(b":2}\n"), vec!["{\"b\":2}".to_string()]);
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn decode_line_steps() {
        let chunk = decode_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#).unwrap();
        assert_eq!(chunk, Step::Chunk(TextChunk::from("Hi")));

        let done = decode_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#).unwrap();
        assert_eq!(done, Step::Done(None));

        let last = decode_line(r#"{"message":{"role":"assistant","content":"!"},"done":true}"#).unwrap();
        assert_eq!(last, Step::Done(Some(TextChunk::from("!"))));

        let err = decode_line(r#"{"error":"model 'nope' not found"}"#).unwrap_err();
        assert_eq!(err, GenerationError::GenerationFailed("Ollama error: model 'nope' not found".into()));
    }
}
