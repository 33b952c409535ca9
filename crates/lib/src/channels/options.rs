//! Session bootstrap options: how the session is named, how the pairing QR is shown,
//! and which browser flags the automation process gets.

use serde::{Deserialize, Serialize};

const DEFAULT_SESSION_NAME: &str = "chatbot-session";

/// How the session name is chosen at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionNaming {
    /// Always the same name, so a paired session is reused across restarts.
    Fixed(String),
    /// `<prefix>-<unix millis>`: a fresh session (and fresh pairing) on every start.
    Timestamped { prefix: String },
}

impl Default for SessionNaming {
    fn default() -> Self {
        SessionNaming::Fixed(DEFAULT_SESSION_NAME.to_string())
    }
}

impl SessionNaming {
    /// Resolve the concrete session name. `now_ms` is only used for `Timestamped`.
    pub fn resolve(&self, now_ms: i64) -> String {
        match self {
            SessionNaming::Fixed(name) => name.clone(),
            SessionNaming::Timestamped { prefix } => format!("{}-{}", prefix, now_ms),
        }
    }

    /// Resolve against the current wall clock.
    pub fn resolve_now(&self) -> String {
        self.resolve(chrono::Utc::now().timestamp_millis())
    }
}

/// Where the pairing QR code goes when the bridge asks for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrDisplay {
    /// Render the QR with Unicode blocks on stderr.
    Terminal,
    /// Log the raw pairing code at info level.
    Log,
    /// Do not show the QR; only status changes are logged.
    #[default]
    Off,
}

/// Session bootstrap options passed to the bridge on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    #[serde(default)]
    pub naming: SessionNaming,

    #[serde(default)]
    pub qr_display: QrDisplay,

    /// Run the browser without a window (default true).
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Extra browser arguments (default: sandbox disabled, as container hosts need).
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,

    /// Multi-device session support (default true).
    #[serde(default = "default_true")]
    pub multidevice: bool,
}

fn default_true() -> bool {
    true
}

fn default_browser_args() -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
    ]
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            naming: SessionNaming::default(),
            qr_display: QrDisplay::default(),
            headless: true,
            browser_args: default_browser_args(),
            multidevice: true,
        }
    }
}
