pub mod stats;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    ChatMember, FileKind, OutgoingFile, OutgoingText, Peer, Plugin, PluginContext, PluginSpec,
    RoomMessageMeta, edit_text, factory::PluginFactory, reply_text,
};
use serde::{Deserialize, Serialize};
use time::UtcOffset;
use tracing::{debug, warn};

use crate::stats::{format_time, report};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrptimeConfig {
    /// Whole hours east of UTC used for display.
    pub utc_offset_hours: i8,
    pub self_query_phrase: String,
    pub info_phrase: String,
}

impl Default for GrptimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            self_query_phrase: "我要查询入群时间".to_owned(),
            info_phrase: "我的信息".to_owned(),
        }
    }
}

impl GrptimeConfig {
    fn offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

/// 1-based window from the first two positional args, default `1 5`.
fn parse_window(args: &str) -> (usize, usize) {
    let mut parts = args.split_whitespace();
    let start = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
    let end = parts.next().and_then(|s| s.parse().ok()).unwrap_or(5);
    (start, end)
}

#[derive(Debug)]
pub struct GrptimePlugin;

impl PluginFactory for GrptimePlugin {
    fn id(&self) -> &'static str {
        "grptime"
    }

    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
        Ok(Arc::new(Grptime {
            config: spec.typed_config(),
        }))
    }
}

#[derive(Debug)]
pub struct Grptime {
    config: GrptimeConfig,
}

impl Grptime {
    async fn member(&self, ctx: &PluginContext, user: &Peer) -> Result<Option<ChatMember>> {
        ctx.chat
            .chat_member(ctx.chat_id(), user)
            .await
            .with_context(|| format!("looking up member {}", user.handle))
    }

    async fn reply_with_own_join_time(&self, ctx: &PluginContext, user: &Peer) -> Result<()> {
        let text = match self.member(ctx, user).await {
            Ok(Some(ChatMember {
                joined_at: Some(at), ..
            })) => format!("You joined at {}", format_time(at, self.config.offset())),
            Ok(_) => "Could not determine your join time.".to_owned(),
            Err(err) => format!("Failed to get join time: {err:#}"),
        };
        reply_text(ctx, text).await.map(|_| ())
    }

    async fn reply_with_member_info(&self, ctx: &PluginContext, user: &Peer) -> Result<()> {
        let member = match self.member(ctx, user).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                return reply_text(ctx, "You are not a member of this chat.").await.map(|_| ());
            }
            Err(err) => {
                return reply_text(ctx, format!("Failed to get your info: {err:#}"))
                    .await
                    .map(|_| ());
            }
        };
        let data = serde_json::to_vec_pretty(&member).context("encoding member info")?;
        let file = OutgoingFile {
            kind: FileKind::Document,
            file_name: "chat_member_info.json".to_owned(),
            mime_type: "application/json".to_owned(),
            data,
        };
        if let Err(err) = ctx
            .chat
            .send_file(ctx.chat_id(), file, Some(ctx.message.id))
            .await
        {
            warn!(plugin = "grptime", error = %err, "Sending member info failed");
            reply_text(ctx, format!("Failed to send your info: {err:#}")).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for Grptime {
    fn id(&self) -> &'static str {
        "grptime"
    }

    fn help(&self) -> &'static str {
        "Join times: reply with `!grptime`, or `!grptime [start] [end]` for the whole chat"
    }

    fn handles_room_messages(&self) -> bool {
        true
    }

    fn wants_own_messages(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
        let offset = self.config.offset();

        if let Some(reply_id) = ctx.message.reply_to {
            let target = match ctx.chat.get_message(ctx.chat_id(), reply_id).await {
                Ok(target) => target,
                Err(err) => {
                    warn!(plugin = "grptime", error = %err, "Loading replied message failed");
                    return edit_text(ctx, format!("Failed to load that message: {err:#}")).await;
                }
            };
            let Some(user) = target.and_then(|m| m.from) else {
                return edit_text(ctx, "Could not find the author of that message.").await;
            };
            let text = match self.member(ctx, &user).await {
                Ok(Some(ChatMember {
                    joined_at: Some(at), ..
                })) => format!("User {} joined at {}", user.full_name(), format_time(at, offset)),
                Ok(_) => format!("Could not determine the join time of {}.", user.full_name()),
                Err(err) => format!("Failed to get join time: {err:#}"),
            };
            return edit_text(ctx, text).await;
        }

        edit_text(ctx, "Collecting member join times…").await?;
        let members = match ctx.chat.chat_members(ctx.chat_id()).await {
            Ok(members) => members,
            Err(err) => {
                warn!(plugin = "grptime", error = %err, "Member listing failed");
                return edit_text(ctx, format!("Failed to list members: {err:#}")).await;
            }
        };
        let (start, end) = parse_window(args);
        debug!(plugin = "grptime", members = members.len(), start, end, "Building join report");
        match report(&members, start, end, offset) {
            Some(text) => edit_text(ctx, OutgoingText::Markdown(text)).await,
            None => edit_text(ctx, "No member join times are available.").await,
        }
    }

    async fn on_room_message(
        &self,
        ctx: &PluginContext,
        _spec: &PluginSpec,
        meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        if !meta.triggered_plugins.is_empty() {
            return Ok(());
        }
        let Some(text) = ctx.message.text.as_deref().map(str::trim) else {
            return Ok(());
        };
        let Some(user) = ctx.message.from.as_ref() else {
            return Ok(());
        };
        if text == self.config.self_query_phrase {
            self.reply_with_own_join_time(ctx, user).await
        } else if text == self.config.info_phrase {
            self.reply_with_member_info(ctx, user).await
        } else {
            Ok(())
        }
    }
}
