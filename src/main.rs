mod app;
mod cli;
mod paths;

#[cfg(feature = "tui")]
mod tui;

use anyhow::Context;
use clap::Parser;
use gemini_repo::config::Config;
use gemini_repo::logging::{self, LogSettings};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: cli::Args) -> anyhow::Result<()> {
    // The TUI owns the terminal, so its log goes to a file.
    #[cfg(feature = "tui")]
    let log_file = match &args.cmd {
        Some(cli::Command::Tui) => Some(paths::tui_log_path()?),
        None => None,
    };
    #[cfg(not(feature = "tui"))]
    let log_file = None;

    let log = logging::init(&LogSettings {
        debug: args.debug,
        format: args.log_format,
        file: log_file,
    })?;

    let config_path = paths::config_file();
    let cfg = match &config_path {
        Some(path) => Config::load_optional(path)?,
        None => {
            tracing::debug!("no config directory could be resolved; using defaults");
            None
        }
    };
    tracing::debug!(?config_path, ?cfg, debug = log.is_debug(), "resolved config");

    let http = gemini_repo::http_client().context("failed to build HTTP client")?;

    #[cfg(feature = "tui")]
    if let Some(cli::Command::Tui) = &args.cmd {
        return tui::run_tui(cfg.as_ref(), http, log).await;
    }

    app::cmd_generate(args, cfg.as_ref(), http).await
}
