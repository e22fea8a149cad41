#![cfg(feature = "tui")]

use crate::app;
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use gemini_repo::config::Config;
use gemini_repo::logging::LogContext;
use gemini_repo::provider::ProviderKind;
use gemini_repo::{GenerationRequest, GenerationWorker, MissingFilePolicy, WorkerEvent, WorkerHandle};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Provider,
    RepoName,
    TargetFile,
    Prompt,
    ContextFiles,
    Model,
    Credential,
    Output,
}

impl Field {
    const ORDER: [Field; 8] = [
        Field::Provider,
        Field::RepoName,
        Field::TargetFile,
        Field::Prompt,
        Field::ContextFiles,
        Field::Model,
        Field::Credential,
        Field::Output,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    fn prev(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// A modal message that blocks input until dismissed.
#[derive(Debug, Clone)]
enum Modal {
    Alert { title: String, message: String },
    ConfirmQuit,
}

struct App {
    kinds: Vec<ProviderKind>,
    provider_idx: usize,
    repo_name: String,
    target_file: String,
    prompt: String,
    context_files: String,
    model: String,
    credential: String,
    output: String,
    focus: Field,
    best_effort: bool,
    log_lines: Vec<String>,
    content: String,
    scroll: u16,
    modal: Option<Modal>,
    worker: Option<WorkerHandle>,
}

impl App {
    fn new(cfg: Option<&Config>) -> Self {
        let kinds = ProviderKind::ALL.to_vec();
        let configured = cfg
            .and_then(|c| c.provider.as_deref())
            .and_then(|p| p.parse::<ProviderKind>().ok())
            .unwrap_or(ProviderKind::Gemini);
        let provider_idx = kinds.iter().position(|k| *k == configured).unwrap_or(0);

        let mut app = Self {
            kinds,
            provider_idx,
            repo_name: String::new(),
            target_file: String::new(),
            prompt: String::new(),
            context_files: String::new(),
            model: String::new(),
            credential: String::new(),
            output: String::new(),
            focus: Field::RepoName,
            best_effort: cfg.and_then(|c| c.missing_files) == Some(MissingFilePolicy::BestEffort),
            log_lines: vec!["Ready. Ctrl+G generate, F2 debug logging, F3 missing-file policy, Esc quit.".to_string()],
            content: String::new(),
            scroll: 0,
            modal: None,
            worker: None,
        };
        app.reset_model(cfg);
        app
    }

    fn kind(&self) -> ProviderKind {
        self.kinds[self.provider_idx]
    }

    fn reset_model(&mut self, cfg: Option<&Config>) {
        let kind = self.kind();
        self.model = cfg
            .and_then(|c| c.model_for(kind.as_str()))
            .unwrap_or_else(|| kind.default_model().to_string());
        self.credential.clear();
    }

    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Provider => None,
            Field::RepoName => Some(&mut self.repo_name),
            Field::TargetFile => Some(&mut self.target_file),
            Field::Prompt => Some(&mut self.prompt),
            Field::ContextFiles => Some(&mut self.context_files),
            Field::Model => Some(&mut self.model),
            Field::Credential => Some(&mut self.credential),
            Field::Output => Some(&mut self.output),
        }
    }

    fn credential_label(&self) -> &'static str {
        match self.kind() {
            ProviderKind::Gemini => "API key (blank: GEMINI_API_KEY)",
            ProviderKind::Ollama => "Host (blank: OLLAMA_HOST or default)",
            ProviderKind::Stub => "(unused)",
        }
    }

    fn worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn policy(&self) -> MissingFilePolicy {
        if self.best_effort {
            MissingFilePolicy::BestEffort
        } else {
            MissingFilePolicy::Strict
        }
    }

    fn context_paths(&self) -> Vec<PathBuf> {
        self.context_files
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    fn alert(&mut self, title: &str, message: impl Into<String>) {
        self.modal = Some(Modal::Alert {
            title: title.to_string(),
            message: message.into(),
        });
    }

    fn status(&mut self, line: impl Into<String>) {
        self.log_lines.push(line.into());
    }
}

pub async fn run_tui(cfg: Option<&Config>, http: reqwest::Client, mut log: LogContext) -> anyhow::Result<()> {
    tracing::info!(event = "ui_start");

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let mut app = App::new(cfg);
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = terminal.draw(|f| draw(f, &app, log.is_debug())) {
                    break Err(anyhow::Error::new(e));
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    match handle_key(key, &mut app, cfg, &http, &mut log) {
                        Ok(true) => break Ok(()),
                        Ok(false) => {}
                        Err(e) => break Err(e),
                    }
                }
            }
            Some(msg) = async {
                match &mut app.worker {
                    Some(w) => w.next_event().await,
                    None => None,
                }
            } => {
                on_worker_event(&mut app, msg);
            }
        }
    };

    if let Some(worker) = app.worker.take() {
        worker.terminate();
    }

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    tracing::info!(event = "ui_close");

    res
}

fn handle_key(
    key: KeyEvent,
    app: &mut App,
    cfg: Option<&Config>,
    http: &reqwest::Client,
    log: &mut LogContext,
) -> anyhow::Result<bool> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if let Some(modal) = app.modal.clone() {
        match modal {
            Modal::Alert { .. } => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    app.modal = None;
                }
            }
            Modal::ConfirmQuit => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    tracing::info!(event = "ui_close_while_worker_running", action = "terminate_worker");
                    return Ok(true);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.modal = None,
                _ => {}
            },
        }
        return Ok(false);
    }

    if key.code == KeyCode::Esc || (ctrl && key.code == KeyCode::Char('c')) {
        if app.worker_running() {
            app.modal = Some(Modal::ConfirmQuit);
            return Ok(false);
        }
        return Ok(true);
    }

    match key.code {
        KeyCode::F(5) => start_generation(app, cfg, http),
        KeyCode::Char('g') if ctrl => start_generation(app, cfg, http),
        KeyCode::F(2) => {
            let debug = !log.is_debug();
            log.set_debug(debug)?;
            app.status(format!("Debug logging {}.", if debug { "enabled" } else { "disabled" }));
        }
        KeyCode::F(3) => {
            app.best_effort = !app.best_effort;
            app.status(format!("Missing context files: {:?}.", app.policy()));
        }
        KeyCode::Tab | KeyCode::Down => app.focus = app.focus.next(),
        KeyCode::BackTab | KeyCode::Up => app.focus = app.focus.prev(),
        KeyCode::PageDown => app.scroll = app.scroll.saturating_add(10),
        KeyCode::PageUp => app.scroll = app.scroll.saturating_sub(10),
        KeyCode::Left | KeyCode::Right if app.focus == Field::Provider => {
            let n = app.kinds.len();
            app.provider_idx = if key.code == KeyCode::Right {
                (app.provider_idx + 1) % n
            } else {
                (app.provider_idx + n - 1) % n
            };
            app.reset_model(cfg);
            tracing::info!(event = "ui_provider_changed", provider = app.kind().as_str());
            app.status(format!("Provider set to {}.", app.kind()));
        }
        KeyCode::Char(c) if !ctrl => {
            if let Some(s) = app.field_mut(app.focus) {
                s.push(c);
            }
        }
        KeyCode::Backspace => {
            if let Some(s) = app.field_mut(app.focus) {
                s.pop();
            }
        }
        _ => {}
    }

    Ok(false)
}

fn start_generation(app: &mut App, cfg: Option<&Config>, http: &reqwest::Client) {
    tracing::info!(event = "ui_generate_button_clicked");
    if app.worker.is_some() {
        app.status("(generation in progress; wait for completion)");
        return;
    }

    let missing = [
        (&app.repo_name, "Repository Name"),
        (&app.target_file, "Target File Name"),
        (&app.prompt, "Prompt"),
    ]
    .into_iter()
    .find(|(value, _)| value.trim().is_empty())
    .map(|(_, name)| name);
    if let Some(name) = missing {
        let msg = format!("{name} is required.");
        app.alert("Input Error", msg.clone());
        app.status(format!("Input error: {msg}"));
        return;
    }

    let kind = app.kind();
    let credential = Some(app.credential.trim().to_string()).filter(|s| !s.is_empty());
    let (api_key, host) = match kind {
        ProviderKind::Gemini => (credential, None),
        ProviderKind::Ollama => (None, credential),
        ProviderKind::Stub => (None, None),
    };
    let model = Some(app.model.trim().to_string()).filter(|s| !s.is_empty());

    let request = GenerationRequest {
        repo_name: app.repo_name.trim().to_string(),
        context_file_paths: app.context_paths(),
        target_file_name: app.target_file.trim().to_string(),
        instruction: app.prompt.trim().to_string(),
        provider: app::provider_config(Some(kind.to_string()), model, api_key, host, cfg, |k| {
            std::env::var(k).ok()
        }),
    };

    app.content.clear();
    app.scroll = 0;
    app.status("Initiating generation...");

    match GenerationWorker::start(request, http.clone(), app.policy()) {
        Ok(worker) => app.worker = Some(worker),
        Err(e) => {
            tracing::error!(event = "ui_api_init_failed", provider = kind.as_str(), error = %e);
            app.alert("API Initialization Error", format!("Failed to initialize {kind} API: {e}"));
            app.status(format!("API Init Error: {e}"));
        }
    }
}

fn on_worker_event(app: &mut App, ev: WorkerEvent) {
    let terminal = ev.is_terminal();
    match ev {
        WorkerEvent::Started(message) => app.status(message),
        WorkerEvent::Succeeded(content) => {
            tracing::info!(event = "ui_generation_success", output_length = content.chars().count());
            let output = app.output.trim().to_string();
            if output.is_empty() {
                app.status("Generation successful! Content displayed.");
            } else {
                match app::write_output(std::path::Path::new(&output), &content) {
                    Ok(()) => {
                        tracing::info!(event = "ui_output_file_saved", path = %output);
                        app.status(format!("Content generated and saved to {output}"));
                    }
                    Err(e) => {
                        tracing::error!(event = "ui_output_file_save_error", path = %output, error = %format!("{e:#}"));
                        app.alert("File Save Error", format!("Failed to save output to {output}: {e:#}"));
                        app.status(format!("Generated content (display only). Error saving to file: {e:#}"));
                    }
                }
            }
            app.content = content;
        }
        WorkerEvent::Failed(message) => {
            app.alert("Generation Error", message.clone());
            app.status(format!("Error: {message}"));
        }
    }
    if terminal {
        app.worker = None;
    }
}

fn draw(f: &mut Frame, app: &App, debug: bool) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(60), Constraint::Min(20)])
        .split(f.area());

    let busy = app.worker.is_some();
    let mut form = Text::default();
    for field in Field::ORDER {
        let (label, value) = match field {
            Field::Provider => ("Provider (←/→)", app.kind().to_string()),
            Field::RepoName => ("Repository name", app.repo_name.clone()),
            Field::TargetFile => ("Target file", app.target_file.clone()),
            Field::Prompt => ("Prompt", app.prompt.clone()),
            Field::ContextFiles => ("Context files (comma separated)", app.context_files.clone()),
            Field::Model => ("Model", app.model.clone()),
            Field::Credential => (app.credential_label(), masked_credential(app)),
            Field::Output => ("Save to file (blank: display only)", app.output.clone()),
        };
        let style = if field == app.focus {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        form.lines.push(Line::styled(label, Style::default().add_modifier(Modifier::BOLD)));
        form.lines.push(Line::from(Span::styled(format!("> {value}"), style)));
        form.lines.push(Line::from(""));
    }
    form.lines.push(Line::from(format!(
        "Debug logging: {}   Missing files: {:?}",
        if debug { "on" } else { "off" },
        app.policy()
    )));
    form.lines.push(Line::styled(
        if busy { "[ Generating... ]" } else { "[ Generate Content: Ctrl+G ]" },
        Style::default().add_modifier(Modifier::BOLD),
    ));

    let form_w = Paragraph::new(form)
        .block(Block::default().borders(Borders::ALL).title("gemini-repo"))
        .wrap(Wrap { trim: false });
    f.render_widget(form_w, cols[0]);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(3)])
        .split(cols[1]);

    let recent = app.log_lines.iter().rev().take(6).rev().cloned().collect::<Vec<_>>();
    let status_w = Paragraph::new(recent.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("status"))
        .wrap(Wrap { trim: false });
    f.render_widget(status_w, rows[0]);

    let content_w = Paragraph::new(app.content.as_str())
        .block(Block::default().borders(Borders::ALL).title("generated content (PgUp/PgDn)"))
        .scroll((app.scroll, 0));
    f.render_widget(content_w, rows[1]);

    if let Some(modal) = &app.modal {
        let (title, message) = match modal {
            Modal::Alert { title, message } => (title.as_str(), format!("{message}\n\n[Enter] OK")),
            Modal::ConfirmQuit => (
                "Confirm Exit",
                "Generation is in progress. Stop it and exit? [y/n]".to_string(),
            ),
        };
        let area = centered(f.area(), 60, 9);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(message)
                .block(Block::default().borders(Borders::ALL).title(title))
                .wrap(Wrap { trim: false }),
            area,
        );
    }
}

fn masked_credential(app: &App) -> String {
    if app.kind() == ProviderKind::Gemini {
        "*".repeat(app.credential.chars().count())
    } else {
        app.credential.clone()
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}
