//! `fy`: translate the account's own messages in place.

pub mod config;
pub mod settings;
pub mod translate;

use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    FLASH_DELAY, OutgoingText, Plugin, PluginContext, PluginSpec, RoomMessageMeta, escape_html,
    factory::PluginFactory, flash, store::JsonStore,
};
use tracing::{debug, info, warn};

pub use crate::{config::FyConfig, settings::FySettings};

const USAGE: &str = "Usage: `!fy` toggles this chat, `!fy all on|off` switches every chat, `!fy set <lang>` picks the target language.";
const TOGGLE_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Eq)]
enum FyCommand {
    Toggle,
    Global(bool),
    SetLang(String),
    Usage,
}

fn parse_command(args: &str) -> FyCommand {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [] => FyCommand::Toggle,
        ["all", "on"] => FyCommand::Global(true),
        ["all", "off"] => FyCommand::Global(false),
        ["set", lang] => FyCommand::SetLang((*lang).to_owned()),
        _ => FyCommand::Usage,
    }
}

#[derive(Debug)]
pub struct FyPlugin;

impl PluginFactory for FyPlugin {
    fn id(&self) -> &'static str {
        "fy"
    }

    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
        let client = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Arc::new(Fy {
            config: spec.typed_config(),
            client,
            global: AtomicBool::new(false),
            store: OnceLock::new(),
        }))
    }
}

#[derive(Debug)]
pub struct Fy {
    config: FyConfig,
    client: reqwest::Client,
    /// Translate everywhere, regardless of `translate_id`. Not persisted.
    global: AtomicBool,
    store: OnceLock<JsonStore<FySettings>>,
}

impl Fy {
    fn store(&self, ctx: &PluginContext) -> &JsonStore<FySettings> {
        self.store
            .get_or_init(|| JsonStore::new(ctx.state_dir.join("fy.json")))
    }

    /// Text of an own group message that should be translated, with the
    /// settings to translate it with.
    async fn translatable<'a>(
        &self,
        ctx: &'a PluginContext,
        meta: &RoomMessageMeta<'_>,
    ) -> Option<(&'a str, FySettings)> {
        let msg = &ctx.message;
        if !msg.outgoing || !meta.triggered_plugins.is_empty() {
            return None;
        }
        let text = msg.text.as_deref().filter(|t| !t.trim().is_empty())?;
        if is_skipped(text, &self.config.skip_prefixes, &ctx.command_prefix) {
            return None;
        }

        let settings = self.store(ctx).load().await;
        if !self.global.load(Ordering::Relaxed) && !settings.is_enabled(ctx.chat_id()) {
            return None;
        }

        match ctx.chat.is_group(ctx.chat_id()).await {
            Ok(true) => Some((text, settings)),
            Ok(false) => None,
            Err(err) => {
                debug!(plugin = "fy", chat = %ctx.chat_id(), error = %err, "Could not tell chat kind");
                None
            }
        }
    }
}

#[async_trait]
impl Plugin for Fy {
    fn id(&self) -> &'static str {
        "fy"
    }

    fn help(&self) -> &'static str {
        "Translate your messages: `!fy`, `!fy all on|off`, `!fy set <lang>`"
    }

    fn handles_room_messages(&self) -> bool {
        true
    }

    fn wants_own_messages(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
        match parse_command(args) {
            FyCommand::Global(on) => {
                self.global.store(on, Ordering::Relaxed);
                info!(plugin = "fy", enabled = on, "Global translation switched");
                let state = if on { "enabled" } else { "disabled" };
                flash(ctx, format!("Global translation {state}."), FLASH_DELAY).await
            }
            FyCommand::SetLang(lang) => {
                let stored = lang.clone();
                let result = self
                    .store(ctx)
                    .update(move |s| {
                        s.from_lang = "auto".to_owned();
                        s.to_lang = stored;
                    })
                    .await;
                match result {
                    Ok(()) => {
                        flash(ctx, format!("Translating from auto to {lang}."), FLASH_DELAY).await
                    }
                    Err(err) => {
                        warn!(plugin = "fy", error = %err, "Saving settings failed");
                        flash(ctx, format!("Failed to save settings: {err}"), FLASH_DELAY).await
                    }
                }
            }
            FyCommand::Toggle => {
                let chat = ctx.chat_id().to_owned();
                let key = chat.clone();
                let enabled = match self.store(ctx).update(move |s| s.toggle(&key)).await {
                    Ok(enabled) => enabled,
                    Err(err) => {
                        warn!(plugin = "fy", error = %err, "Saving settings failed");
                        return flash(ctx, format!("Failed to save settings: {err}"), FLASH_DELAY)
                            .await;
                    }
                };
                let state = if enabled { "enabled" } else { "disabled" };
                let text = OutgoingText::Html {
                    plain: format!("Translation {state} for chat {chat}"),
                    html: format!("Translation {state} for chat <code>{}</code>", escape_html(&chat)),
                };
                flash(ctx, text, TOGGLE_DELAY).await
            }
            FyCommand::Usage => flash(ctx, USAGE, FLASH_DELAY).await,
        }
    }

    async fn on_room_message(
        &self,
        ctx: &PluginContext,
        _spec: &PluginSpec,
        meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        let Some((text, settings)) = self.translatable(ctx, meta).await else {
            return Ok(());
        };

        let translated = translate::translate(
            &self.client,
            &self.config,
            text,
            &settings.from_lang,
            &settings.to_lang,
        )
        .await;
        let translated = match translated {
            Ok(Some(translated)) => translated,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(plugin = "fy", error = %format!("{err:#}"), "Translation request failed");
                return Ok(());
            }
        };
        debug!(plugin = "fy", chat = %ctx.chat_id(), to = %settings.to_lang, "Translated outgoing message");
        ctx.chat
            .edit_text(ctx.chat_id(), ctx.message.id, render(text, &translated))
            .await
    }
}

fn is_skipped(text: &str, prefixes: &[String], command_prefix: &str) -> bool {
    (!command_prefix.is_empty() && text.starts_with(command_prefix))
        || prefixes
            .iter()
            .any(|p| !p.is_empty() && text.starts_with(p.as_str()))
}

fn render(original: &str, translated: &str) -> OutgoingText {
    OutgoingText::Html {
        plain: format!("{original}\n> {translated}"),
        html: format!(
            "<b>{}</b><br><blockquote><i>{}</i></blockquote>",
            escape_html(original),
            escape_html(translated)
        ),
    }
}
