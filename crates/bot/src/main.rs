mod dispatch;
mod formatting;
mod logging;
mod matrix;
mod plugins;
mod timeline;

use core::time::Duration;
use std::{
    fs,
    io::IsTerminal as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::OriginalSyncRoomMessageEvent,
    },
};
use plugin_core::PluginSpec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{dispatch::Dispatcher, logging::init_tracing, matrix::MatrixChat};

#[derive(Parser, Debug)]
#[command(
    name = "chat-plugins-bot",
    version,
    about = "Matrix account running quote, translation, speech and lookup plugins"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache, plugin state)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "chat-plugins-bot")]
    device_name: String,

    /// Path to the YAML bot config
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Directory holding per-plugin `<id>/config.yaml` overrides
    #[arg(long, env = "PLUGINS_DIR", default_value = "./plugins")]
    plugins_dir: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub(crate) struct BotConfig {
    pub(crate) command_prefix: String,
    /// Messages remembered per room for numbering and lookups.
    pub(crate) timeline_capacity: usize,
    pub(crate) plugins: Option<Vec<PluginSpec>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_owned(),
            timeline_capacity: 2000,
            plugins: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    // Build client with SQLite store to persist E2EE state
    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    login(&client, &args).await?;

    let config = load_config(&args.config)?;
    let registry = plugins::build_registry(&config, &args.plugins_dir).await;
    plugins::start_plugins(&registry).await;
    info!(prefix = %config.command_prefix, commands = ?registry.commands().await, "Registered plugin commands");

    // Auto-join handler for invites
    if !args.no_autojoin {
        client.add_event_handler(
            async move |ev: StrippedRoomMemberEvent, room: Room, client: Client| {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    let matrix = Arc::new(MatrixChat::new(client.clone(), config.timeline_capacity));
    let dispatcher = Arc::new(Dispatcher::new(
        matrix,
        registry,
        args.store.join("state"),
        &config.command_prefix,
    ));
    client.add_event_handler(move |ev: OriginalSyncRoomMessageEvent, room: Room| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.handle(&ev, &room).await }
    });

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

/// Restore the saved session, or log in with a password and save a new one.
async fn login(client: &Client, args: &Args) -> Result<()> {
    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        return client
            .restore_session(matrix_session)
            .await
            .context("restoring session");
    }

    // Treat empty env/arg as missing; avoid prompting in non-interactive (Docker) mode.
    let password = if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        p.to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!(
                "No MATRIX_PASSWORD provided and no stored session. In Docker/non-interactive mode, set MATRIX_PASSWORD env or mount an existing session at {}",
                args.session_file.display()
            ));
        }
        warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
        #[cfg(feature = "rpassword")]
        {
            rpassword::prompt_password("Matrix password:")
                .map_err(|e| anyhow!("Failed to read password: {e}"))?
        }
        #[cfg(not(feature = "rpassword"))]
        {
            return Err(anyhow!(
                "rpassword feature is not enabled. Cannot prompt for password."
            ));
        }
    };

    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(
        "Logged in: user={} device={}",
        session.user_id, session.device_id
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        warn!(file = %path.display(), "Config file not found, using defaults");
        return Ok(BotConfig::default());
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

fn load_session(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(cfg.command_prefix, "!");
        assert_eq!(cfg.timeline_capacity, 2000);
        assert!(cfg.plugins.is_none());
    }

    #[test]
    fn config_fields_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "command_prefix: \",\"\nplugins:\n  - id: q\n    config:\n      quote:\n        max_offset: 20\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.command_prefix, ",");
        assert_eq!(cfg.timeline_capacity, 2000);
        assert_eq!(cfg.plugins.unwrap()[0].id, "q");
    }

    #[test]
    fn sessions_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        assert!(load_session(&path).unwrap().is_none());
        let session = SavedSession {
            access_token: "tok".to_owned(),
            refresh_token: None,
            user_id: "@bot:example.org".to_owned(),
            device_id: "DEV".to_owned(),
        };
        save_session(&path, &session).unwrap();
        let loaded = load_session(&path).unwrap().unwrap();
        assert_eq!(loaded.user_id, "@bot:example.org");
        assert_eq!(loaded.access_token, "tok");
    }
}
