use clap::Parser;
#[cfg(feature = "tui")]
use clap::Subcommand;
use gemini_repo::logging::LogFormat;
use std::path::PathBuf;

/// Generate content for a repository file with an LLM
#[derive(Debug, Parser)]
#[command(name = "gemini-repo")]
#[command(version)]
#[command(about = "Generate content for a target file using repository context and an LLM", long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Args {
    /// Logical name of the repository (used as prompt context)
    #[arg(value_name = "REPO_NAME", required = true)]
    pub repo_name: Option<String>,

    /// Name/path of the file to generate content for
    #[arg(value_name = "TARGET_FILE", required = true)]
    pub target_file: Option<String>,

    /// Instruction guiding the generation
    #[arg(value_name = "PROMPT", required = true)]
    pub prompt: Option<String>,

    /// Files whose contents are included as context, in order
    #[arg(short = 'f', long = "files", value_name = "FILE_PATH", num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// API key for the cloud provider (overrides GEMINI_API_KEY)
    #[arg(short = 'k', long = "api-key")]
    pub api_key: Option<String>,

    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider: gemini, ollama or stub (default: config/provider or "gemini")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Ollama host URL (overrides OLLAMA_HOST)
    #[arg(long = "host")]
    pub host: Option<String>,

    /// Write generated content here instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Skip context files that do not exist instead of failing
    #[arg(long = "best-effort")]
    pub best_effort: bool,

    /// Enable DEBUG level logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Log record format (written to stderr)
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    #[cfg(feature = "tui")]
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[cfg(feature = "tui")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the interactive terminal UI
    Tui,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_positionals_and_files() {
        let args = Args::try_parse_from([
            "gemini-repo",
            "demo",
            "out.md",
            "Summarize",
            "-f",
            "a.txt",
            "b.txt",
            "--provider",
            "ollama",
            "-d",
        ])
        .unwrap();

        assert_eq!(args.repo_name.as_deref(), Some("demo"));
        assert_eq!(args.target_file.as_deref(), Some("out.md"));
        assert_eq!(args.prompt.as_deref(), Some("Summarize"));
        assert_eq!(args.files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(args.provider.as_deref(), Some("ollama"));
        assert!(args.debug);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn positionals_are_required() {
        assert!(Args::try_parse_from(["gemini-repo", "demo"]).is_err());
    }
}
