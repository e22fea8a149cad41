use crate::context::MissingFilePolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Provider identifier ("gemini", "ollama" or "stub").
    pub provider: Option<String>,

    /// What to do with listed context files that do not exist.
    pub missing_files: Option<MissingFilePolicy>,

    #[serde(default)]
    pub gemini: GeminiSection,

    #[serde(default)]
    pub ollama: OllamaSection,
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct GeminiSection {
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for GeminiSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSection")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaSection {
    pub model: Option<String>,
    pub host: Option<String>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Model configured for the given provider kind, if any.
    pub fn model_for(&self, kind: &str) -> Option<String> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => self.gemini.model.clone(),
            "ollama" => self.ollama.model.clone(),
            _ => None,
        }
    }
}
