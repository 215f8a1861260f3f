pub mod chat;
pub mod factory;
pub mod store;

pub use chat::{
    ChatApi, ChatId, ChatMember, ChatMessage, Entity, FLASH_DELAY, FileKind, Forward, Media,
    MediaHandle, MessageId, OutgoingFile, OutgoingText, Peer, stable_id,
};

use core::time::Duration;
use std::{borrow::ToOwned, collections::HashMap, collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct PluginContext {
    pub chat: Arc<dyn ChatApi>,
    /// The message that triggered this invocation.
    pub message: ChatMessage,
    pub registry: Arc<PluginRegistry>,
    pub state_dir: Arc<PathBuf>,
    pub command_prefix: Arc<str>,
}

impl PluginContext {
    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.message.chat_id
    }
}

/// Extra information handed to passive listeners.
#[derive(Debug)]
pub struct RoomMessageMeta<'a> {
    /// Plugins that already ran a command for this message.
    pub triggered_plugins: &'a HashSet<String>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;
    fn handles_room_messages(&self) -> bool {
        false
    }
    fn wants_own_messages(&self) -> bool {
        false
    }

    /// One-time startup work, run after the registry is built.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;

    async fn on_room_message(
        &self,
        _ctx: &PluginContext,
        _spec: &PluginSpec,
        _meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl PluginSpec {
    /// Enabled spec for `id` answering to a single command of the same name.
    #[must_use]
    pub fn command(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            enabled: true,
            triggers: PluginTriggers {
                commands: vec![id.to_owned()],
            },
            config: serde_yaml::Value::default(),
        }
    }

    /// Parse `config` into a typed struct, falling back to defaults.
    #[must_use]
    pub fn typed_config<T>(&self) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.config.is_null() {
            return T::default();
        }
        match serde_yaml::from_value::<T>(self.config.clone()) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(plugin = %self.id, error = %err, "Failed to parse plugin config, using defaults");
                T::default()
            }
        }
    }
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a plugin; returns the entry it replaced.
    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        inner.by_command.retain(|_, existing| *existing != id);
        for cmd in &spec.triggers.commands {
            let key = normalize_cmd(cmd);
            if let Some(prev) = inner.by_command.insert(key.clone(), id.clone())
                && prev != id
            {
                debug!(command = %key, from = %prev, to = %id, "Command re-bound");
            }
        }
        inner.by_id.insert(id, PluginEntry { spec, plugin })
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    /// Look up by command name, with or without a leading prefix character.
    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(&normalize_cmd(token))
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn commands(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner.by_command.keys().cloned().collect();
        out.sort();
        out
    }

    #[must_use]
    pub async fn is_enabled(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.by_id.get(id).is_some_and(|entry| entry.spec.enabled)
    }
}

fn normalize_cmd(s: &str) -> String {
    s.trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

pub fn str_config(spec: &PluginSpec, key: &str) -> Option<String> {
    spec.config
        .get(key)
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[must_use]
pub fn sanitize_line(s: &str, max: usize) -> String {
    let compact = s.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&compact, max)
}

#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace the triggering message's text (or the host's status stand-in).
pub async fn edit_text(ctx: &PluginContext, text: impl Into<OutgoingText>) -> Result<()> {
    ctx.chat
        .edit_text(ctx.chat_id(), ctx.message.id, text.into())
        .await
}

/// Post a new message in the same chat, replying to the trigger.
pub async fn reply_text(ctx: &PluginContext, text: impl Into<OutgoingText>) -> Result<MessageId> {
    ctx.chat
        .send_text(ctx.chat_id(), text.into(), Some(ctx.message.id))
        .await
}

pub async fn delete_trigger(ctx: &PluginContext) -> Result<()> {
    ctx.chat.delete_message(ctx.chat_id(), ctx.message.id).await
}

/// Show `text` in place of the trigger, then remove it after `delay`.
pub async fn flash(ctx: &PluginContext, text: impl Into<OutgoingText>, delay: Duration) -> Result<()> {
    edit_text(ctx, text).await?;
    let chat = Arc::clone(&ctx.chat);
    let chat_id = ctx.chat_id().to_owned();
    let id = ctx.message.id;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = chat.delete_message(&chat_id, id).await {
            debug!(error = %e, chat = %chat_id, "Delayed delete failed");
        }
    });
    Ok(())
}
