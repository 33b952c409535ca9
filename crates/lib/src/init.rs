//! Initialize the configuration directory: create ~/.zaprelay, a default config, and the
//! sessions directory. Also removes stored session data on request.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with the default config if missing.
/// - Creates the `sessions` subdirectory for browser session data.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&config::Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let sessions = config::sessions_dir(config_path);
    if !sessions.exists() {
        std::fs::create_dir_all(&sessions)
            .with_context(|| format!("creating sessions directory {}", sessions.display()))?;
        log::info!("created sessions directory at {}", sessions.display());
    } else {
        log::debug!("sessions directory already exists at {}, skipping", sessions.display());
    }

    Ok(config_dir.to_path_buf())
}

/// Remove the stored data for one session so the next start pairs from scratch.
/// Returns the removed directory, or `None` when there was nothing to remove.
pub fn reset_session_dir(config_path: &Path, session_name: &str) -> Result<Option<PathBuf>> {
    if !is_plain_session_name(session_name) {
        anyhow::bail!("invalid session name: {:?}", session_name);
    }
    let dir = config::session_data_dir(config_path, session_name);
    if !dir.exists() {
        log::debug!("no session data at {}", dir.display());
        return Ok(None);
    }
    std::fs::remove_dir_all(&dir)
        .with_context(|| format!("removing session data at {}", dir.display()))?;
    log::info!("removed session data at {}", dir.display());
    Ok(Some(dir))
}

/// A session name must be a single ordinary path component (no `.`, `..`, separators).
fn is_plain_session_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}
