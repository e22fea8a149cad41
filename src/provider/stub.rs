use super::{ChunkStream, GenerateFuture, Provider, TextChunk};
use crate::error::{GenerationError, Result};
use crate::prompt::AssembledPrompt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline provider that replays a fixed script.
///
/// Without a script it echoes a short summary of the prompt it received.
#[derive(Debug, Default, Clone)]
pub struct StubProvider {
    script: Option<Vec<String>>,
    fail_with: Option<String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream exactly these chunks.
    pub fn scripted<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Some(chunks.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// After the scripted chunks, end the stream with a failure.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many times `generate` has been called, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn chunks_for(&self, prompt: &AssembledPrompt) -> Vec<String> {
        if let Some(script) = &self.script {
            return script.clone();
        }
        vec![
            "[stub provider]\n".to_string(),
            format!("parts: {}\n", prompt.len()),
            format!("context files: {}\n", prompt.context_paths().count()),
            format!("target: {}\n", prompt.target_file().unwrap_or_default()),
        ]
    }
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub"
    }

    fn generate(&self, prompt: AssembledPrompt) -> GenerateFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.chunks_for(&prompt);
        let fail_with = self.fail_with.clone();
        let delay = self.delay;

        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<Result<TextChunk>>(32);

            tokio::spawn(async move {
                for text in chunks {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if tx.send(Ok(TextChunk { text })).await.is_err() {
                        return;
                    }
                }
                if let Some(message) = fail_with {
                    let _ = tx.send(Err(GenerationError::GenerationFailed(message))).await;
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}
