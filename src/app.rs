use crate::cli::Args;
use anyhow::Context;
use gemini_repo::config::Config;
use gemini_repo::provider::{google, ollama, Provider, ProviderConfig};
use gemini_repo::{GenerationError, GenerationRequest, GenerationSession, MissingFilePolicy};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

pub const DEFAULT_PROVIDER: &str = "gemini";

/// Merge CLI flags, environment and config file into a provider selection.
///
/// Precedence: flag, then environment, then config file, then the
/// provider's built-in default.
pub fn provider_config(
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    host: Option<String>,
    cfg: Option<&Config>,
    env: impl Fn(&str) -> Option<String>,
) -> ProviderConfig {
    let kind = provider
        .or_else(|| cfg.and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let model = model.or_else(|| cfg.and_then(|c| c.model_for(&kind)));

    let api_key = api_key
        .or_else(|| env(google::API_KEY_ENV))
        .or_else(|| cfg.and_then(|c| c.gemini.api_key.clone()));

    let host = host
        .or_else(|| env(ollama::HOST_ENV))
        .or_else(|| cfg.and_then(|c| c.ollama.host.clone()));

    ProviderConfig {
        kind,
        model,
        api_key,
        host,
    }
}

pub fn missing_file_policy(best_effort: bool, cfg: Option<&Config>) -> MissingFilePolicy {
    if best_effort {
        return MissingFilePolicy::BestEffort;
    }
    cfg.and_then(|c| c.missing_files).unwrap_or_default()
}

/// One-line label for a pipeline error, shown before its message.
pub fn failure_label(e: &GenerationError) -> &'static str {
    match e {
        e if e.is_configuration() => "Initialization failed",
        GenerationError::ContextFileNotFound(_) | GenerationError::ContextFileUnreadable { .. } => {
            "Could not read context file"
        }
        _ => "Failed to generate content",
    }
}

pub async fn cmd_generate(args: Args, cfg: Option<&Config>, http: reqwest::Client) -> anyhow::Result<()> {
    let started = Instant::now();

    let provider = provider_config(
        args.provider,
        args.model,
        args.api_key,
        args.host,
        cfg,
        |k| std::env::var(k).ok(),
    );
    let policy = missing_file_policy(args.best_effort, cfg);

    let request = GenerationRequest {
        repo_name: args.repo_name.context("missing REPO_NAME")?,
        context_file_paths: args.files,
        target_file_name: args.target_file.context("missing TARGET_FILE")?,
        instruction: args.prompt.context("missing PROMPT")?,
        provider,
    };
    tracing::info!(
        event = "cli_start",
        repo_name = %request.repo_name,
        target_file = %request.target_file_name,
        context_files = ?request.context_file_paths,
        provider = %request.provider.kind,
        policy = ?policy
    );

    let mut session = GenerationSession::new(http, policy);
    match session.resolve_provider(&request.provider) {
        Ok(p) => tracing::info!(event = "api_init", status = "success", provider = p.name(), model = p.model()),
        Err(e) => {
            tracing::error!(event = "api_init", status = "failed", error = %e);
            let label = failure_label(&e);
            return Err(anyhow::Error::new(e).context(label));
        }
    }

    let mut echo = ChunkEcho::new(args.output.is_none().then(std::io::stdout));
    let result = session
        .run_observed(&request, |chunk| echo.write(chunk))
        .await
        .map_err(|e| {
            let label = failure_label(&e);
            anyhow::Error::new(e).context(label)
        })?;

    match &args.output {
        Some(path) => {
            write_output(path, &result.text)?;
            tracing::info!(event = "output_write", status = "success", destination = %path.display());
            eprintln!("Content successfully written to {}", path.display());
        }
        None => {
            echo.write("\n");
            let status = if echo.is_open() { "success" } else { "closed" };
            tracing::info!(event = "output_write", status, destination = "stdout");
        }
    }

    tracing::info!(
        event = "cli_end",
        status = "success",
        total_duration_ms = started.elapsed().as_millis() as u64
    );
    Ok(())
}

/// Echoes streamed chunks to a writer. The first write error (e.g. a closed
/// pipe) stops the echo; generation itself carries on.
struct ChunkEcho<W: Write> {
    out: Option<W>,
}

impl<W: Write> ChunkEcho<W> {
    fn new(out: Option<W>) -> Self {
        Self { out }
    }

    fn write(&mut self, chunk: &str) {
        let Some(out) = self.out.as_mut() else { return };
        if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(event = "output_write", status = "stdout_closed", error = %e);
            self.out = None;
        }
    }

    fn is_open(&self) -> bool {
        self.out.is_some()
    }
}

/// Write `content` to `path`, creating parent directories as needed.
pub fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("failed to write output to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_repo::config::{GeminiSection, OllamaSection};
    use std::path::PathBuf;

    fn cfg() -> Config {
        Config {
            provider: Some("ollama".into()),
            missing_files: Some(MissingFilePolicy::BestEffort),
            gemini: GeminiSection {
                model: Some("gemini-from-config".into()),
                api_key: Some("config-key".into()),
            },
            ollama: OllamaSection {
                model: Some("qwen2.5-coder".into()),
                host: Some("http://config-host:11434".into()),
            },
        }
    }

    #[test]
    fn defaults_without_config() {
        let p = provider_config(None, None, None, None, None, |_| None);
        assert_eq!(p.kind, "gemini");
        assert_eq!(p.model, None);
        assert_eq!(p.api_key, None);
    }

    #[test]
    fn config_fills_gaps() {
        let c = cfg();
        let p = provider_config(None, None, None, None, Some(&c), |_| None);
        assert_eq!(p.kind, "ollama");
        assert_eq!(p.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(p.host.as_deref(), Some("http://config-host:11434"));
    }

    #[test]
    fn flag_beats_env_beats_config() {
        let c = cfg();
        let env = |k: &str| (k == google::API_KEY_ENV).then(|| "env-key".to_string());

        let p = provider_config(Some("gemini".into()), None, None, None, Some(&c), env);
        assert_eq!(p.api_key.as_deref(), Some("env-key"));
        assert_eq!(p.model.as_deref(), Some("gemini-from-config"));

        let p = provider_config(Some("gemini".into()), Some("m".into()), Some("flag-key".into()), None, Some(&c), env);
        assert_eq!(p.api_key.as_deref(), Some("flag-key"));
        assert_eq!(p.model.as_deref(), Some("m"));
    }

    #[test]
    fn policy_flag_and_config() {
        assert_eq!(missing_file_policy(false, None), MissingFilePolicy::Strict);
        assert_eq!(missing_file_policy(true, None), MissingFilePolicy::BestEffort);
        assert_eq!(missing_file_policy(false, Some(&cfg())), MissingFilePolicy::BestEffort);
    }

    #[test]
    fn labels_follow_error_kind() {
        assert_eq!(
            failure_label(&GenerationError::UnsupportedProvider("x".into())),
            "Initialization failed"
        );
        assert_eq!(
            failure_label(&GenerationError::ContextFileNotFound(PathBuf::from("a.txt"))),
            "Could not read context file"
        );
        assert_eq!(
            failure_label(&GenerationError::GenerationFailed("boom".into())),
            "Failed to generate content"
        );
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echo_passes_chunks_through() {
        let mut echo = ChunkEcho::new(Some(Vec::new()));
        echo.write("Hel");
        echo.write("lo");
        assert_eq!(echo.out.as_deref(), Some(&b"Hello"[..]));
    }

    #[test]
    fn echo_stops_after_closed_pipe() {
        let mut echo = ChunkEcho::new(Some(ClosedPipe));
        echo.write("a");
        assert!(!echo.is_open());
        echo.write("b");
        echo.write("\n");
        assert!(!echo.is_open());
    }

    #[test]
    fn write_output_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.md");
        write_output(&path, "content").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }
}
