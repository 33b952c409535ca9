//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.zaprelay/config.json`) and environment.
//! `BACKEND_API_URL` and `ZAPRELAY_BRIDGE_URL` override the file values.

use crate::channels::SessionOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (health and /send-message).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Backend API that answers relayed messages.
    #[serde(default)]
    pub backend: BackendConfig,

    /// WebSocket bridge to the WhatsApp Web automation process.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Session bootstrap options (name, QR display, browser flags).
    #[serde(default)]
    pub session: SessionOptions,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Backend API endpoint. The URL is usually supplied via BACKEND_API_URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub url: Option<String>,

    /// Request timeout in milliseconds (default 30000).
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Bridge WebSocket endpoint and per-request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// WebSocket URL of the bridge (default "ws://127.0.0.1:3001/ws").
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// How long to wait for a bridge result frame, in milliseconds (default 30000).
    #[serde(default = "default_bridge_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3001/ws".to_string()
}

fn default_bridge_timeout_ms() -> u64 {
    30_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            timeout_ms: default_bridge_timeout_ms(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the backend URL: env BACKEND_API_URL overrides config.
/// `None` is not an error here; every forward then fails and users get the fallback text.
pub fn resolve_backend_url(config: &Config) -> Option<String> {
    non_empty_env("BACKEND_API_URL").or_else(|| {
        config
            .backend
            .url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the bridge URL: env ZAPRELAY_BRIDGE_URL overrides config.
pub fn resolve_bridge_url(config: &Config) -> String {
    non_empty_env("ZAPRELAY_BRIDGE_URL").unwrap_or_else(|| config.bridge.url.trim().to_string())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ZAPRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".zaprelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Directory holding per-session browser data: `sessions` next to the config file.
pub fn sessions_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("sessions")
}

/// Browser profile directory for one session, handed to the bridge on connect.
pub fn session_data_dir(config_path: &Path, session_name: &str) -> PathBuf {
    sessions_dir(config_path).join(session_name)
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
