use std::path::PathBuf;

/// Errors raised by the generation pipeline.
///
/// Frontends match on the variant to decide how to present a failure; the
/// message of the originating backend or I/O error is always kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{provider} API key not provided and {env_var} is not set")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("context file not found: {}", .0.display())]
    ContextFileNotFound(PathBuf),

    #[error("error reading context file {}: {message}", path.display())]
    ContextFileUnreadable { path: PathBuf, message: String },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("generation session already finished; start a new session")]
    SessionFinished,
}

impl GenerationError {
    /// Wrap any backend or transport error, keeping its full context chain.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::GenerationFailed(format!("{err:#}"))
    }

    /// Wrap a transport error under `context`.
    ///
    /// The request URL is stripped (it may carry the API key) and the
    /// source chain is kept so the OS-level cause stays visible.
    pub fn transport(context: &'static str, err: reqwest::Error) -> Self {
        Self::failed(anyhow::Error::new(err.without_url()).context(context))
    }

    /// Configuration errors are detected before any network activity.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::UnsupportedProvider(_)
        )
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::transport("HTTP transport error", e)
    }
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;
