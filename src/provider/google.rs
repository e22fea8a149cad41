use super::{ChunkStream, GenerateFuture, Provider, TextChunk};
use crate::error::{GenerationError, Result};
use crate::prompt::AssembledPrompt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";

const CANDIDATE_COUNT: u32 = 1;
const TEMPERATURE: f32 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Google Gemini over the Generative Language REST API.
#[derive(Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: Url,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("model", &self.model)
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Build a provider, taking the key from `api_key` or else from
    /// `GEMINI_API_KEY`.
    pub fn new(http: reqwest::Client, api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_env(http, api_key, model, |k| std::env::var(k).ok())
    }

    /// Like [`new`](Self::new) with an explicit environment lookup.
    pub fn with_env(
        http: reqwest::Client,
        api_key: Option<String>,
        model: impl Into<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env(API_KEY_ENV).filter(|k| !k.trim().is_empty()))
            .ok_or(GenerationError::MissingCredential {
                provider: "gemini",
                env_var: API_KEY_ENV,
            })?;

        let model = model.into();
        tracing::info!(event = "client_init", provider = "gemini", model_name = %model, status = "success");
        Ok(Self {
            http,
            api_key,
            model,
            api_base: Url::parse(DEFAULT_API_BASE).map_err(GenerationError::failed)?,
        })
    }

    /// Point the provider at another endpoint, e.g. a proxy or a test server.
    pub fn with_api_base(mut self, base: &str) -> Result<Self> {
        self.api_base = Url::parse(base).map_err(GenerationError::failed)?;
        Ok(self)
    }

    fn build_url(&self) -> Result<Url> {
        // v1beta:streamGenerateContent supports Server-Sent Events with alt=sse.
        // Docs: https://ai.google.dev/api/rest/v1beta/models/streamGenerateContent
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{}:streamGenerateContent", self.model))
            .map_err(GenerationError::failed)?;

        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("alt", "sse");
        Ok(url)
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: AssembledPrompt) -> GenerateFuture {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url()?;
            let body = StreamGenerateContentRequest::from_prompt(&prompt);

            let resp = this
                .http
                .post(url)
                .headers(Self::headers())
                .json(&body)
                .send()
                .await
                .map_err(|e| GenerationError::transport("failed to start Gemini request", e))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(GenerationError::GenerationFailed(format!(
                    "Gemini API error: HTTP {status}: {text}"
                )));
            }

            let (tx, rx) = mpsc::channel::<Result<TextChunk>>(64);

            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut parser = SseParser::new();

                while let Some(item) = stream.next().await {
                    let bytes = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx
                                .send(Err(GenerationError::transport("network stream error", e)))
                                .await;
                            return;
                        }
                    };

                    for ev in parser.push(&bytes) {
                        match ev.and_then(decode_event) {
                            Ok(Some(chunk)) => {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                }

                // A final event not followed by a blank line.
                if let Some(ev) = parser.finish() {
                    match decode_event(ev) {
                        Ok(Some(chunk)) => {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                        }
                    }
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

fn decode_event(ev: SseEvent) -> Result<Option<TextChunk>> {
    let SseEvent::Data(data) = ev else {
        return Ok(None);
    };
    if data.trim().is_empty() {
        return Ok(None);
    }

    let r: StreamGenerateContentResponse = serde_json::from_str(&data)
        .map_err(|e| GenerationError::GenerationFailed(format!("failed to parse SSE JSON: {e}")))?;
    if let Some(err) = r.error {
        return Err(GenerationError::GenerationFailed(format!(
            "Gemini API error: {}",
            err.message
        )));
    }
    Ok(extract_text(&r).map(|text| TextChunk { text }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamGenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl StreamGenerateContentRequest {
    /// One user turn carrying every prompt segment as its own part, in order.
    fn from_prompt(prompt: &AssembledPrompt) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: prompt
                    .segments()
                    .into_iter()
                    .map(|text| Part { text: Some(text) })
                    .collect(),
            }],
            generation_config: GenerationConfig {
                candidate_count: CANDIDATE_COUNT,
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    candidate_count: u32,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(r: &StreamGenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let cand = r.candidates.first()?;
    let content = cand.content.as_ref()?;
    let mut out = String::new();
    for p in &content.parts {
        if let Some(t) = &p.text {
            out.push_str(t);
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Other,
}

/// Minimal SSE parser.
///
/// - Splits on raw bytes so multi-byte characters may straddle network chunks
/// - Emits Data events when a blank line ends an event
struct SseParser {
    buf: Vec<u8>,
    cur_data: String,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            cur_data: String::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseEvent>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.drain(..=pos).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }

            if line.is_empty() {
                if let Some(ev) = self.take_data() {
                    out.push(Ok(ev));
                }
                continue;
            }

            let s = match std::str::from_utf8(&line) {
                Ok(s) => s,
                Err(e) => {
                    out.push(Err(GenerationError::GenerationFailed(format!(
                        "SSE line is not valid UTF-8: {e}"
                    ))));
                    continue;
                }
            };

            if let Some(rest) = s.strip_prefix("data:") {
                // Optional leading space.
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.cur_data.push_str(rest);
                self.cur_data.push('\n');
            } else {
                // event:, id:, retry:, comments
                out.push(Ok(SseEvent::Other));
            }
        }

        out
    }

    /// Flush a pending event at end of stream.
    fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let tail = std::mem::take(&mut self.buf);
            if let Ok(s) = std::str::from_utf8(&tail) {
                if let Some(rest) = s.trim_end_matches('\r').strip_prefix("data:") {
                    self.cur_data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
                    self.cur_data.push('\n');
                }
            }
        }
        self.take_data()
    }

    fn take_data(&mut self) -> Option<SseEvent> {
        if self.cur_data.is_empty() {
            return None;
        }
        if self.cur_data.ends_with('\n') {
            self.cur_data.pop();
        }
        Some(SseEvent::Data(std::mem::take(&mut self.cur_data)))
    }
}
