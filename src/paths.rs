use anyhow::Context;
use std::env;
#[cfg(feature = "tui")]
use std::path::Path;
use std::path::PathBuf;

fn home_dir() -> anyhow::Result<PathBuf> {
    // HOME is standard on Unix; USERPROFILE covers Windows.
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

#[cfg(feature = "tui")]
fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn app_home() -> Option<PathBuf> {
    env::var_os("GEMINI_REPO_HOME").map(PathBuf::from)
}

/// Where `config.toml` would live. Nothing is created here since the
/// file is optional; `None` when no base directory can be determined.
pub fn config_dir() -> Option<PathBuf> {
    resolve_config_dir(
        app_home(),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        home_dir().ok(),
    )
}

fn resolve_config_dir(app_home: Option<PathBuf>, xdg: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    app_home
        .map(|base| base.join("config"))
        .or_else(|| xdg.map(|x| x.join("gemini-repo")))
        .or_else(|| home.map(|h| h.join(".config").join("gemini-repo")))
}

#[cfg(feature = "tui")]
pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = app_home() {
        return ensure_dir(&base.join("state"));
    }

    if let Some(xdg) = env::var_os("XDG_STATE_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join("gemini-repo"));
    }

    ensure_dir(&home_dir()?.join(".local").join("state").join("gemini-repo"))
}

pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Where the terminal UI writes its log, since stderr belongs to the screen.
#[cfg(feature = "tui")]
pub fn tui_log_path() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("tui.log"))
}
