use crate::error::Result;
use crate::prompt::AssembledPrompt;
use futures_core::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
}

impl From<&str> for TextChunk {
    fn from(s: &str) -> Self {
        Self { text: s.to_string() }
    }
}

/// Chunks in arrival order. Finite and not restartable.
pub type ChunkStream = BoxStream<'static, Result<TextChunk>>;

pub type GenerateFuture = Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send>>;

pub type CompleteFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// Provider interface.
///
/// A provider consumes an assembled prompt and yields the model's reply as it
/// streams in. Every transport or backend failure surfaces as
/// `GenerationError::GenerationFailed`.
pub trait Provider {
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Start streaming a response.
    fn generate(&self, prompt: AssembledPrompt) -> GenerateFuture;

    /// Collect the whole streamed reply into one string.
    fn generate_complete(&self, prompt: AssembledPrompt) -> CompleteFuture {
        let started = self.generate(prompt);
        Box::pin(async move {
            let mut stream = started.await?;
            let mut out = String::new();
            while let Some(chunk) = stream.next().await {
                out.push_str(&chunk?.text);
            }
            Ok(out)
        })
    }
}
