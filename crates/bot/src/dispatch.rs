use std::{collections::HashSet, path::PathBuf, sync::Arc};

use matrix_sdk::{room::Room, ruma::events::room::message::OriginalSyncRoomMessageEvent};
use plugin_core::{ChatApi, PluginContext, PluginRegistry, RoomMessageMeta, truncate};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::matrix::MatrixChat;

/// Routes synced room messages to plugins.
pub struct Dispatcher {
    matrix: Arc<MatrixChat>,
    registry: Arc<PluginRegistry>,
    state_dir: Arc<PathBuf>,
    command_prefix: Arc<str>,
    /// Commands run one at a time.
    running: Mutex<()>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state_dir", &self.state_dir)
            .field("command_prefix", &self.command_prefix)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        matrix: Arc<MatrixChat>,
        registry: Arc<PluginRegistry>,
        state_dir: PathBuf,
        command_prefix: &str,
    ) -> Self {
        Self {
            matrix,
            registry,
            state_dir: Arc::new(state_dir),
            command_prefix: Arc::from(command_prefix),
            running: Mutex::new(()),
        }
    }

    pub async fn handle(&self, ev: &OriginalSyncRoomMessageEvent, room: &Room) {
        let Some(message) = self.matrix.ingest(room, ev).await else {
            return;
        };
        let body = message.body().map(|b| truncate(b, 200));
        info!(room_id = %room.room_id(), sender = %ev.sender, id = message.id, body = ?body, "Incoming message");

        let outgoing = message.outgoing;
        let chat: Arc<dyn ChatApi> = Arc::<MatrixChat>::clone(&self.matrix);
        let ctx = PluginContext {
            chat,
            message,
            registry: Arc::clone(&self.registry),
            state_dir: Arc::clone(&self.state_dir),
            command_prefix: Arc::clone(&self.command_prefix),
        };
        let mut triggered_plugins: HashSet<String> = HashSet::new();

        let command = ctx
            .message
            .text
            .as_deref()
            .and_then(|text| split_command(text, &self.command_prefix));
        if let Some((cmd, args)) = command
            && let Some(entry) = self.registry.entry_by_command(cmd).await
        {
            let plugin_id = entry.spec.id.clone();
            if self.registry.is_enabled(&plugin_id).await {
                info!(plugin = %plugin_id, args = %args, "Running command");
                let _guard = self.running.lock().await;
                if let Err(e) = entry.plugin.run(&ctx, args, &entry.spec).await {
                    warn!(error = %format!("{e:#}"), plugin = %plugin_id, "Plugin failed");
                } else {
                    triggered_plugins.insert(plugin_id);
                }
            } else {
                info!(plugin = %plugin_id, "Plugin disabled");
            }
        }

        let meta = RoomMessageMeta {
            triggered_plugins: &triggered_plugins,
        };
        for (plugin_id, entry) in self.registry.entries().await {
            if !entry.plugin.handles_room_messages() || !entry.spec.enabled {
                continue;
            }
            if outgoing && !entry.plugin.wants_own_messages() {
                continue;
            }
            debug!(plugin = %plugin_id, "Passive dispatch");
            if let Err(e) = entry.plugin.on_room_message(&ctx, &entry.spec, &meta).await {
                warn!(error = %format!("{e:#}"), plugin = %plugin_id, "Plugin on_room_message failed");
            }
        }
    }
}

/// `"!q 3 r"` -> `("q", "3 r")` for prefix `!`.
fn split_command<'a>(text: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let rest = text.trim().strip_prefix(prefix)?;
    let (cmd, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(c, a)| (c, a.trim()));
    if cmd.is_empty() { None } else { Some((cmd, args)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_split_on_first_whitespace() {
        assert_eq!(split_command("!q 3 r", "!"), Some(("q", "3 r")));
        assert_eq!(split_command("  !bin 457173  ", "!"), Some(("bin", "457173")));
        assert_eq!(split_command("!mtts\nline two", "!"), Some(("mtts", "line two")));
        assert_eq!(split_command(",fy all on", ","), Some(("fy", "all on")));
    }

    #[test]
    fn non_commands_are_ignored() {
        assert_eq!(split_command("hello !q", "!"), None);
        assert_eq!(split_command("! q", "!"), None);
        assert_eq!(split_command("!", "!"), None);
    }
}
