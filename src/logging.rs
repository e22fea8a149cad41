use anyhow::Context;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Noisy transport crates stay at info even in debug mode.
const DEBUG_DIRECTIVES: &str = "debug,hyper=info,hyper_util=info,reqwest=info,h2=info,rustls=info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub debug: bool,
    pub format: LogFormat,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Handle on the installed subscriber.
///
/// Frontends hold this and pass it where the log level needs to change; the
/// pipeline itself only emits events.
#[derive(Debug, Clone)]
pub struct LogContext {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    debug: bool,
}

impl LogContext {
    /// A context with no subscriber behind it.
    pub fn detached() -> Self {
        Self {
            handle: None,
            debug: false,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Switch between debug and the default level at runtime.
    pub fn set_debug(&mut self, enabled: bool) -> anyhow::Result<()> {
        if let Some(handle) = &self.handle {
            handle
                .reload(filter_for(enabled))
                .context("failed to reload log filter")?;
        }
        self.debug = enabled;
        let level = if enabled { "DEBUG" } else { "INFO" };
        tracing::info!(event = "debug_logging_toggled", level);
        Ok(())
    }
}

fn filter_for(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(DEBUG_DIRECTIVES)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the process subscriber. Call once, early in `main`.
pub fn init(settings: &LogSettings) -> anyhow::Result<LogContext> {
    let (filter, handle) = reload::Layer::new(filter_for(settings.debug));

    let writer = match &settings.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_ansi(settings.file.is_none())
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LogContext {
        handle: Some(handle),
        debug: settings.debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_context_tracks_debug_flag() {
        let mut ctx = LogContext::detached();
        assert!(!ctx.is_debug());
        ctx.set_debug(true).unwrap();
        assert!(ctx.is_debug());
    }

    #[test]
    fn debug_filter_keeps_transport_quiet() {
        let f = filter_for(true).to_string();
        assert!(f.contains("hyper=info"));
    }
}
