//! `mtts`: text to speech through Azure Speech.

pub mod azure;
pub mod config;
pub mod settings;

use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    FileKind, MessageId, OutgoingFile, OutgoingText, Plugin, PluginContext, PluginSpec,
    delete_trigger, edit_text, factory::PluginFactory, store::JsonStore,
};
use tracing::{info, warn};

pub use crate::{azure::SpeechClient, config::MttsConfig, settings::TtsSettings};

const USAGE: &str = "Usage: `!mtts <text>`, reply to a message with `!mtts`, or `!mtts setname|setrate|setvolume|list <value>`.";
const UNREACHABLE: &str = "Could not reach the speech service, try again later.";
const LOOKUP_FAILED: &str = "Could not load the replied message.";

#[derive(Debug, PartialEq, Eq)]
enum MttsCommand<'a> {
    SetName(&'a str),
    SetRate(&'a str),
    SetVolume(&'a str),
    List(&'a str),
    Speak(&'a str),
    /// No text: speak the replied-to message.
    SpeakReply,
}

/// Subcommands need an argument; a bare `setname` is read as text.
fn parse_command(args: &str) -> MttsCommand<'_> {
    let args = args.trim();
    if args.is_empty() {
        return MttsCommand::SpeakReply;
    }
    let (head, rest) = args
        .split_once(char::is_whitespace)
        .map_or((args, ""), |(h, r)| (h, r.trim()));
    match (head, rest) {
        (_, "") => MttsCommand::Speak(args),
        ("setname", v) => MttsCommand::SetName(v),
        ("setrate", v) => MttsCommand::SetRate(v),
        ("setvolume", v) => MttsCommand::SetVolume(v),
        ("list", tag) => MttsCommand::List(tag),
        _ => MttsCommand::Speak(args),
    }
}

fn voice_file(audio: Vec<u8>) -> OutgoingFile {
    OutgoingFile {
        kind: FileKind::Voice,
        file_name: "mtts.mp3".to_owned(),
        mime_type: "audio/mpeg".to_owned(),
        data: audio,
    }
}

#[derive(Debug)]
pub struct MttsPlugin;

impl PluginFactory for MttsPlugin {
    fn id(&self) -> &'static str {
        "mtts"
    }

    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
        let config: MttsConfig = spec.typed_config();
        if config.key().is_none() {
            warn!(plugin = "mtts", env = %config.api_key_env, "No speech key configured");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("chat-plugins/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Arc::new(Mtts {
            speech: SpeechClient::new(client, config),
            store: OnceLock::new(),
        }))
    }
}

#[derive(Debug)]
pub struct Mtts {
    speech: SpeechClient,
    store: OnceLock<JsonStore<TtsSettings>>,
}

impl Mtts {
    fn store(&self, ctx: &PluginContext) -> &JsonStore<TtsSettings> {
        self.store
            .get_or_init(|| JsonStore::new(ctx.state_dir.join("mtts.json")))
    }

    async fn save(
        &self,
        ctx: &PluginContext,
        label: &str,
        apply: impl FnOnce(&mut TtsSettings) + Send,
    ) -> Result<()> {
        match self.store(ctx).update(apply).await {
            Ok(()) => edit_text(ctx, format!("{label} saved.")).await,
            Err(err) => {
                warn!(plugin = "mtts", error = %err, "Saving settings failed");
                edit_text(ctx, format!("Failed to save settings: {err}")).await
            }
        }
    }

    async fn speak(&self, ctx: &PluginContext, text: &str, reply_to: Option<MessageId>) -> Result<bool> {
        let settings = self.store(ctx).load().await;
        let audio = match self.speech.synthesize(&settings, text).await {
            Ok(audio) => audio,
            Err(err) => {
                warn!(plugin = "mtts", error = %format!("{err:#}"), "Synthesis failed");
                edit_text(ctx, UNREACHABLE).await?;
                return Ok(false);
            }
        };
        info!(plugin = "mtts", voice = %settings.short_name, bytes = audio.len(), "Synthesized");
        deliver(ctx, audio, reply_to).await
    }
}

/// Send the audio; a failed upload is reported on the command instead.
async fn deliver(
    ctx: &PluginContext,
    audio: Vec<u8>,
    reply_to: Option<MessageId>,
) -> Result<bool> {
    match ctx
        .chat
        .send_file(ctx.chat_id(), voice_file(audio), reply_to)
        .await
    {
        Ok(()) => Ok(true),
        Err(err) => {
            warn!(plugin = "mtts", error = %format!("{err:#}"), "Sending voice failed");
            edit_text(ctx, format!("Failed to send voice message: {err}")).await?;
            Ok(false)
        }
    }
}

#[async_trait]
impl Plugin for Mtts {
    fn id(&self) -> &'static str {
        "mtts"
    }

    fn help(&self) -> &'static str {
        "Text to speech: `!mtts <text>`, or reply with `!mtts`; `setname`, `setrate`, `setvolume`, `list <tag>`"
    }

    async fn run(&self, ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
        match parse_command(args) {
            MttsCommand::SetName(name) => {
                let voices = match self.speech.voices().await {
                    Ok(voices) => voices,
                    Err(err) => {
                        warn!(plugin = "mtts", error = %format!("{err:#}"), "Voice list failed");
                        return edit_text(ctx, UNREACHABLE).await;
                    }
                };
                if !voices.iter().any(|v| v.short_name == name) {
                    return edit_text(ctx, format!("Unknown voice `{name}`, see `!mtts list <tag>`.")).await;
                }
                let name = name.to_owned();
                self.save(ctx, "Voice", move |s| s.short_name = name).await
            }
            MttsCommand::SetRate(rate) => {
                let rate = rate.to_owned();
                self.save(ctx, "Rate", move |s| s.rate = rate).await
            }
            MttsCommand::SetVolume(volume) => {
                let volume = volume.to_owned();
                self.save(ctx, "Volume", move |s| s.volume = volume).await
            }
            MttsCommand::List(tag) => match self.speech.voices().await {
                Ok(voices) => {
                    let table = azure::voice_table(&voices, tag);
                    edit_text(ctx, OutgoingText::Markdown(format!("```\n{table}\n```"))).await
                }
                Err(err) => {
                    warn!(plugin = "mtts", error = %format!("{err:#}"), "Voice list failed");
                    edit_text(ctx, UNREACHABLE).await
                }
            },
            MttsCommand::Speak(text) => {
                if self.speak(ctx, text, ctx.message.reply_to).await? {
                    delete_trigger(ctx).await?;
                }
                Ok(())
            }
            MttsCommand::SpeakReply => {
                let Some(reply_id) = ctx.message.reply_to else {
                    return edit_text(ctx, USAGE).await;
                };
                let target = match ctx.chat.get_message(ctx.chat_id(), reply_id).await {
                    Ok(target) => target,
                    Err(err) => {
                        warn!(plugin = "mtts", error = %format!("{err:#}"), "Loading replied message failed");
                        return edit_text(ctx, LOOKUP_FAILED).await;
                    }
                };
                let Some(text) = target
                    .as_ref()
                    .and_then(|m| m.body())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                else {
                    return edit_text(ctx, USAGE).await;
                };
                if self.speak(ctx, &text, Some(reply_id)).await? {
                    delete_trigger(ctx).await?;
                }
                Ok(())
            }
        }
    }
}
