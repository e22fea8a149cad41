//! Repository-aware content generation.
//!
//! Context files from a repository are assembled into a tagged prompt, sent
//! to a pluggable LLM backend, and the streamed reply is collected as the
//! content of a target file.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod worker;

pub use context::{ContextReader, MissingFilePolicy};
pub use error::GenerationError;
pub use prompt::{AssembledPrompt, PromptAssembler, PromptPart};
pub use provider::{Provider, ProviderConfig, ProviderHandle};
pub use session::{GenerationRequest, GenerationResult, GenerationSession, SessionState};
pub use worker::{GenerationWorker, WorkerEvent, WorkerHandle};

/// Shared HTTP client with the crate user agent.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
