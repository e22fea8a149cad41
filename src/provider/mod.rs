pub mod google;
pub mod ollama;
pub mod stub;
mod types;

pub use google::GeminiProvider;
pub use ollama::OllamaProvider;
pub use stub::StubProvider;
pub use types::{ChunkStream, CompleteFuture, GenerateFuture, Provider, TextChunk};

use crate::error::{GenerationError, Result};
use crate::prompt::AssembledPrompt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backends this build knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Ollama,
    Stub,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Gemini, ProviderKind::Ollama, ProviderKind::Stub];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Stub => "stub",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => google::DEFAULT_MODEL,
            ProviderKind::Ollama => ollama::DEFAULT_MODEL,
            ProviderKind::Stub => "stub",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "stub" => Ok(ProviderKind::Stub),
            _ => Err(GenerationError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Caller-supplied backend selection. `kind` stays a plain string so that an
/// unknown backend is reported when the provider is resolved.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// A constructed backend. Built once per session and never mutated.
#[derive(Debug, Clone)]
pub enum ProviderHandle {
    Cloud(GeminiProvider),
    Local(OllamaProvider),
    Stub(StubProvider),
}

impl ProviderHandle {
    /// Resolve a config into a ready backend. No network I/O happens here.
    pub fn from_config(cfg: &ProviderConfig, http: &reqwest::Client) -> Result<Self> {
        Self::from_config_with_env(cfg, http, |k| std::env::var(k).ok())
    }

    pub fn from_config_with_env(
        cfg: &ProviderConfig,
        http: &reqwest::Client,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let kind: ProviderKind = cfg.kind.parse()?;
        let model = cfg
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.default_model().to_string());

        match kind {
            ProviderKind::Gemini => {
                #[cfg(feature = "google")]
                {
                    let p = GeminiProvider::with_env(http.clone(), cfg.api_key.clone(), model, env)?;
                    Ok(ProviderHandle::Cloud(p))
                }
                #[cfg(not(feature = "google"))]
                {
                    let _ = (http, model, env);
                    Err(GenerationError::UnsupportedProvider(
                        "gemini (not enabled in this build)".to_string(),
                    ))
                }
            }
            ProviderKind::Ollama => {
                #[cfg(feature = "ollama")]
                {
                    let p = OllamaProvider::with_env(http.clone(), cfg.host.clone(), model, env);
                    Ok(ProviderHandle::Local(p))
                }
                #[cfg(not(feature = "ollama"))]
                {
                    let _ = (http, model, env);
                    Err(GenerationError::UnsupportedProvider(
                        "ollama (not enabled in this build)".to_string(),
                    ))
                }
            }
            ProviderKind::Stub => Ok(ProviderHandle::Stub(StubProvider::new())),
        }
    }

    fn inner(&self) -> &dyn Provider {
        match self {
            ProviderHandle::Cloud(p) => p,
            ProviderHandle::Local(p) => p,
            ProviderHandle::Stub(p) => p,
        }
    }
}

impl From<StubProvider> for ProviderHandle {
    fn from(p: StubProvider) -> Self {
        ProviderHandle::Stub(p)
    }
}

impl From<GeminiProvider> for ProviderHandle {
    fn from(p: GeminiProvider) -> Self {
        ProviderHandle::Cloud(p)
    }
}

impl From<OllamaProvider> for ProviderHandle {
    fn from(p: OllamaProvider) -> Self {
        ProviderHandle::Local(p)
    }
}

impl Provider for ProviderHandle {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }

    fn generate(&self, prompt: AssembledPrompt) -> GenerateFuture {
        self.inner().generate(prompt)
    }
}
