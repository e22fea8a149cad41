use crate::context::MissingFilePolicy;
use crate::error::{GenerationError, Result};
use crate::prompt::PromptAssembler;
use crate::provider::{Provider, ProviderConfig, ProviderHandle};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tokio_stream::StreamExt;
use tracing::Instrument;

/// Everything needed for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub repo_name: String,
    pub context_file_paths: Vec<PathBuf>,
    pub target_file_name: String,
    pub instruction: String,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    /// Length of `text` in characters.
    pub char_length: usize,
}

impl GenerationResult {
    fn new(text: String) -> Self {
        let char_length = text.chars().count();
        Self { text, char_length }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Assembling,
    Streaming,
    Succeeded,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }

    fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Assembling => "assembling",
            SessionState::Streaming => "streaming",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a single generation: resolve the backend, assemble the prompt,
/// stream the reply.
///
/// A session is single-use. Once it reaches `Succeeded` or `Failed`,
/// further runs return `GenerationError::SessionFinished`.
#[derive(Debug)]
pub struct GenerationSession {
    http: reqwest::Client,
    assembler: PromptAssembler,
    provider: Option<ProviderHandle>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl GenerationSession {
    pub fn new(http: reqwest::Client, policy: MissingFilePolicy) -> Self {
        Self {
            http,
            assembler: PromptAssembler::new(policy),
            provider: None,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    /// Use an already-built provider instead of resolving `request.provider`.
    pub fn with_provider(provider: ProviderHandle, policy: MissingFilePolicy) -> Self {
        Self {
            provider: Some(provider),
            ..Self::new(reqwest::Client::new(), policy)
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Resolve the backend now so configuration errors surface before any
    /// work starts. Idempotent.
    pub fn resolve_provider(&mut self, cfg: &ProviderConfig) -> Result<&ProviderHandle> {
        if self.state.is_terminal() {
            return Err(GenerationError::SessionFinished);
        }
        if self.provider.is_none() {
            self.provider = Some(ProviderHandle::from_config(cfg, &self.http)?);
        }
        self.provider.as_ref().ok_or(GenerationError::SessionFinished)
    }

    pub async fn run(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.run_observed(request, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_chunk` with each chunk as it arrives.
    pub async fn run_observed<F>(&mut self, request: &GenerationRequest, on_chunk: F) -> Result<GenerationResult>
    where
        F: FnMut(&str),
    {
        if self.state != SessionState::Idle {
            return Err(GenerationError::SessionFinished);
        }

        let provider = self.resolve_provider(&request.provider)?.clone();
        let span = tracing::info_span!(
            "generation",
            provider = provider.name(),
            model = provider.model(),
            target_file = %request.target_file_name,
        );

        let started = Instant::now();
        tracing::info!(
            parent: &span,
            event = "generation_start",
            repo_name = %request.repo_name,
            context_files = request.context_file_paths.len()
        );

        let outcome = self
            .execute(&provider, request, on_chunk)
            .instrument(span.clone())
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                self.transition(SessionState::Succeeded, &span);
                tracing::info!(
                    parent: &span,
                    event = "generation_end",
                    status = "success",
                    duration_ms,
                    output_length = result.char_length
                );
            }
            Err(e) => {
                self.transition(SessionState::Failed, &span);
                tracing::error!(
                    parent: &span,
                    event = "generation_end",
                    status = "failed",
                    duration_ms,
                    error = %e
                );
            }
        }
        outcome
    }

    async fn execute<F>(
        &mut self,
        provider: &ProviderHandle,
        request: &GenerationRequest,
        mut on_chunk: F,
    ) -> Result<GenerationResult>
    where
        F: FnMut(&str),
    {
        let span = tracing::Span::current();

        self.transition(SessionState::Assembling, &span);
        let prompt = self.assembler.build(
            &request.repo_name,
            &request.context_file_paths,
            &request.target_file_name,
            &request.instruction,
        )?;

        self.transition(SessionState::Streaming, &span);
        let mut stream = provider.generate(prompt).await?;

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(&chunk.text);
            text.push_str(&chunk.text);
        }

        Ok(GenerationResult::new(text))
    }

    fn transition(&mut self, next: SessionState, span: &tracing::Span) {
        tracing::debug!(parent: span, event = "session_state", from = %self.state, to = %next);
        self.state = next;
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StubProvider;

    fn request(paths: Vec<PathBuf>) -> GenerationRequest {
        GenerationRequest {
            repo_name: "demo".into(),
            context_file_paths: paths,
            target_file_name: "out.md".into(),
            instruction: "Summarize".into(),
            provider: ProviderConfig::new("stub"),
        }
    }

    #[tokio::test]
    async fn accumulates_chunks_in_order() {
        let stub = StubProvider::scripted(["Hel", "lo, ", "world"]);
        let mut session = GenerationSession::with_provider(stub.into(), MissingFilePolicy::Strict);

        let mut seen = Vec::new();
        let result = session
            .run_observed(&request(vec![]), |c| seen.push(c.to_string()))
            .await
            .unwrap();

        assert_eq!(result.text, "Hello, world");
        assert_eq!(result.char_length, 12);
        assert_eq!(seen, vec!["Hel", "lo, ", "world"]);
        assert_eq!(
            session.history(),
            [
                SessionState::Idle,
                SessionState::Assembling,
                SessionState::Streaming,
                SessionState::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn char_length_counts_characters_not_bytes() {
        let stub = StubProvider::scripted(["⫻", "é"]);
        let mut session = GenerationSession::with_provider(stub.into(), MissingFilePolicy::Strict);
        let result = session.run(&request(vec![])).await.unwrap();
        assert_eq!(result.char_length, 2);
    }

    #[tokio::test]
    async fn missing_context_file_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a.txt");
        let stub = StubProvider::scripted(["unused"]);
        let mut session = GenerationSession::with_provider(stub.clone().into(), MissingFilePolicy::Strict);

        let err = session.run(&request(vec![missing.clone()])).await.unwrap_err();

        assert_eq!(err, GenerationError::ContextFileNotFound(missing));
        assert_eq!(stub.calls(), 0);
        assert_eq!(
            session.history(),
            [SessionState::Idle, SessionState::Assembling, SessionState::Failed]
        );
    }

    #[tokio::test]
    async fn backend_failure_is_surfaced_with_message() {
        let stub = StubProvider::scripted(["partial"]).then_fail("HTTP 503: overloaded");
        let mut session = GenerationSession::with_provider(stub.into(), MissingFilePolicy::Strict);

        let err = session.run(&request(vec![])).await.unwrap_err();
        assert_eq!(err, GenerationError::GenerationFailed("HTTP 503: overloaded".into()));
        assert_eq!(
            session.history(),
            [
                SessionState::Idle,
                SessionState::Assembling,
                SessionState::Streaming,
                SessionState::Failed
            ]
        );
    }

    #[tokio::test]
    async fn finished_session_cannot_run_again() {
        let stub = StubProvider::scripted(["x"]);
        let mut session = GenerationSession::with_provider(stub.clone().into(), MissingFilePolicy::Strict);

        session.run(&request(vec![])).await.unwrap();
        let err = session.run(&request(vec![])).await.unwrap_err();

        assert_eq!(err, GenerationError::SessionFinished);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_provider_fails_while_idle() {
        let mut session = GenerationSession::new(reqwest::Client::new(), MissingFilePolicy::Strict);
        let mut req = request(vec![]);
        req.provider = ProviderConfig::new("nope");

        let err = session.run(&req).await.unwrap_err();
        assert_eq!(err, GenerationError::UnsupportedProvider("nope".into()));
        // Nothing started, so the session is still usable.
        assert_eq!(session.history(), [SessionState::Idle]);
    }

    #[tokio::test]
    async fn best_effort_session_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.txt");
        let mut session = GenerationSession::new(reqwest::Client::new(), MissingFilePolicy::BestEffort);

        let result = session.run(&request(vec![missing])).await.unwrap();
        assert!(result.text.contains("context files: 0"));
    }
}
