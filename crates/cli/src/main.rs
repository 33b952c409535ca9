use clap::{Parser, Subcommand, ValueEnum};
use lib::channels::{BridgeClient, QrDisplay, SessionClient, SessionNaming};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "zaprelay")]
#[command(about = "Relay WhatsApp messages to a backend API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum QrArg {
    Terminal,
    Log,
    Off,
}

impl From<QrArg> for QrDisplay {
    fn from(q: QrArg) -> Self {
        match q {
            QrArg::Terminal => QrDisplay::Terminal,
            QrArg::Log => QrDisplay::Log,
            QrArg::Off => QrDisplay::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config.json, and the sessions directory.
    Init {
        /// Config file path (default: ZAPRELAY_CONFIG_PATH or ~/.zaprelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Connect the WhatsApp session, relay inbound messages to the backend, and serve /send-message.
    Run {
        /// Config file path (default: ZAPRELAY_CONFIG_PATH or ~/.zaprelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Use this fixed session name
        #[arg(long, value_name = "NAME", conflicts_with = "timestamped_session")]
        session: Option<String>,

        /// Start a fresh session named <PREFIX>-<unix millis>
        #[arg(long, value_name = "PREFIX")]
        timestamped_session: Option<String>,

        /// How to show the pairing QR code
        #[arg(long, value_enum)]
        qr: Option<QrArg>,

        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },

    /// Send a message through a running relay's /send-message endpoint.
    Send {
        /// Config file path, used to find the relay address
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Phone number (digits) or chat id
        #[arg(long, short)]
        number: String,

        /// Message text
        #[arg(long, short)]
        message: String,

        /// Full endpoint URL (default: http://<gateway.bind>:<gateway.port>/send-message)
        #[arg(long)]
        url: Option<String>,
    },

    /// Delete stored session data so the next run pairs again.
    ResetSession {
        /// Config file path (default: ZAPRELAY_CONFIG_PATH or ~/.zaprelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Session name (default: the configured fixed name)
        #[arg(long, value_name = "NAME")]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("zaprelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run {
            config,
            port,
            session,
            timestamped_session,
            qr,
            headful,
        }) => {
            let overrides = RunOverrides {
                port,
                session,
                timestamped_session,
                qr,
                headful,
            };
            // Message tasks contain their own panics; one escaping here is fatal.
            let code = match tokio::spawn(run_relay(config, overrides)).await {
                Ok(Ok(exit)) => exit.exit_code(),
                Ok(Err(e)) => {
                    log::error!("relay failed: {:#}", e);
                    1
                }
                Err(e) => {
                    log::error!("relay crashed: {}", e);
                    1
                }
            };
            std::process::exit(code);
        }
        Some(Commands::Send {
            config,
            number,
            message,
            url,
        }) => {
            if let Err(e) = run_send(config, number, message, url).await {
                log::error!("send failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::ResetSession { config, session }) => {
            if let Err(e) = run_reset_session(config, session) {
                log::error!("reset-session failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

struct RunOverrides {
    port: Option<u16>,
    session: Option<String>,
    timestamped_session: Option<String>,
    qr: Option<QrArg>,
    headful: bool,
}

async fn run_relay(
    config_path: Option<PathBuf>,
    overrides: RunOverrides,
) -> anyhow::Result<lib::gateway::RunExit> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = overrides.port {
        config.gateway.port = p;
    }
    if let Some(name) = overrides.session {
        config.session.naming = SessionNaming::Fixed(name);
    }
    if let Some(prefix) = overrides.timestamped_session {
        config.session.naming = SessionNaming::Timestamped { prefix };
    }
    if let Some(q) = overrides.qr {
        config.session.qr_display = q.into();
    }
    if overrides.headful {
        config.session.headless = false;
    }

    let session_name = config.session.naming.resolve_now();
    let bridge_url = lib::config::resolve_bridge_url(&config);
    let data_dir = lib::config::session_data_dir(&path, &session_name);
    log::info!(
        "starting relay (session {}, data {}, bridge {})",
        session_name,
        data_dir.display(),
        bridge_url
    );
    let client: Arc<dyn SessionClient> = Arc::new(
        BridgeClient::new(
            bridge_url,
            session_name,
            config.session.clone(),
            Duration::from_millis(config.bridge.timeout_ms),
        )
        .with_data_dir(data_dir),
    );
    let exit = lib::gateway::run_gateway(config, client).await?;
    if let lib::gateway::RunExit::SessionFatal(ref state) = exit {
        log::error!("session disconnected ({}), exiting", state);
    }
    Ok(exit)
}

async fn run_send(
    config_path: Option<PathBuf>,
    number: String,
    message: String,
    url: Option<String>,
) -> anyhow::Result<()> {
    let url = match url {
        Some(u) => u,
        None => {
            let (config, _) = lib::config::load_config(config_path)?;
            format!(
                "http://{}:{}/send-message",
                config.gateway.bind.trim(),
                config.gateway.port
            )
        }
    };
    let res = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "number": number, "message": message }))
        .send()
        .await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await.unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        let err = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        anyhow::bail!("{} {}", status, err);
    }
    let msg = body
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("sent");
    println!("{}", msg);
    Ok(())
}

fn run_reset_session(config_path: Option<PathBuf>, session: Option<String>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let name = match session {
        Some(s) => s,
        None => match &config.session.naming {
            SessionNaming::Fixed(name) => name.clone(),
            SessionNaming::Timestamped { .. } => {
                anyhow::bail!("timestamped sessions are new on every run; pass --session NAME")
            }
        },
    };
    match lib::init::reset_session_dir(&path, &name)? {
        Some(dir) => println!("removed session data at {}", dir.display()),
        None => println!("no session data for {}", name),
    }
    Ok(())
}
