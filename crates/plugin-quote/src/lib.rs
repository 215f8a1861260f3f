//! `q`: render a run of chat messages as a quote card.

pub mod args;
pub mod config;
pub mod extract;
pub mod media;
pub mod pipeline;
pub mod range;
pub mod render;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    MessageId, Plugin, PluginContext, PluginSpec, delete_trigger, edit_text,
    factory::PluginFactory,
};
use tracing::{info, warn};

pub use crate::{
    args::{QuoteArgs, parse_args},
    config::QuoteConfig,
    media::MediaError,
    pipeline::{QuoteError, QuoteJob, QuotePipeline, QuoteReport},
    render::{HttpRenderer, QuoteRenderer, RenderRequest},
    storage::{ObjectStore, S3Store},
};

const USAGE: &str = "Reply to a message with `!q [count] [color] [r]`, or send `!q -count` to quote the messages before this one.";

#[derive(Debug)]
pub struct QuotePlugin;

impl PluginFactory for QuotePlugin {
    fn id(&self) -> &'static str {
        "q"
    }

    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        if specs.iter().any(|s| s.id == self.id()) {
            return;
        }
        let mut spec = PluginSpec::command(self.id());
        spec.config = serde_yaml::to_value(QuoteConfig::default()).unwrap_or_default();
        specs.push(spec);
    }

    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
        let config: QuoteConfig = spec.typed_config();
        let store = S3Store::from_config(&config.s3).context("configuring quote object storage")?;
        if store.is_none() {
            warn!(plugin = "q", "S3 section incomplete, media will render as a placeholder");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("chat-plugins/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        let renderer = HttpRenderer::new(client, config.api.quote_api_url.clone());
        Ok(Arc::new(Quote {
            config,
            store,
            renderer,
        }))
    }
}

#[derive(Debug)]
pub struct Quote {
    config: QuoteConfig,
    store: Option<S3Store>,
    renderer: HttpRenderer,
}

#[async_trait]
impl Plugin for Quote {
    fn id(&self) -> &'static str {
        "q"
    }

    fn help(&self) -> &'static str {
        "Make a quote card: reply with `!q [n|-n] [#color|name] [r]`, or send `!q -n` alone"
    }

    async fn start(&self) -> Result<()> {
        if let Some(store) = &self.store {
            store
                .verify()
                .await
                .context("object storage connectivity check")?;
        }
        Ok(())
    }

    async fn run(&self, ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
        let parsed = parse_args(args.split_whitespace(), &self.config.quote.background_color);

        let limit = self.config.quote.max_offset;
        if parsed.offset.unsigned_abs() > u64::from(limit) {
            return edit_text(ctx, format!("❌ At most {limit} messages can be quoted at once")).await;
        }

        let Some(base) = batch_base(ctx.message.reply_to, ctx.message.id, parsed.offset) else {
            return edit_text(ctx, USAGE).await;
        };

        edit_text(ctx, "Generating quote…").await?;

        let pipeline = QuotePipeline {
            chat: ctx.chat.as_ref(),
            store: self.store.as_ref().map(|s| s as &dyn ObjectStore),
            renderer: &self.renderer,
            quote: &self.config.quote,
            media: &self.config.media,
        };
        let job = QuoteJob {
            chat_id: ctx.chat_id(),
            base,
            skip: Some(ctx.message.id),
            args: &parsed,
            reply_to: ctx.message.reply_to,
        };

        match pipeline.run(&job).await {
            Ok(report) => {
                info!(plugin = "q", rendered = report.rendered, leftover = report.leftover, "Quote done");
                delete_trigger(ctx).await
            }
            Err(err) => {
                warn!(plugin = "q", error = %err, "Quote failed");
                edit_text(ctx, format!("❌ {err}")).await
            }
        }
    }
}

/// First message of the batch. Without a reply only a backwards count makes
/// sense, since nothing after the command exists yet.
const fn batch_base(
    reply_to: Option<MessageId>,
    command: MessageId,
    offset: i64,
) -> Option<MessageId> {
    match reply_to {
        Some(id) => Some(id),
        None if offset < 0 => Some(command),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_full_config() {
        let mut specs = Vec::new();
        QuotePlugin.register_defaults(&mut specs);
        QuotePlugin.register_defaults(&mut specs);
        assert_eq!(specs.len(), 1);
        let cfg: QuoteConfig = specs[0].typed_config();
        assert_eq!(cfg.quote.format, "webp");
        assert_eq!(specs[0].triggers.commands, vec!["q".to_owned()]);
    }

    #[test]
    fn replies_anchor_the_batch() {
        assert_eq!(batch_base(Some(7), 1000, 0), Some(7));
        assert_eq!(batch_base(Some(7), 1000, 3), Some(7));
        assert_eq!(batch_base(Some(7), 1000, -3), Some(7));
    }

    #[test]
    fn without_reply_only_backwards_counts_are_accepted() {
        assert_eq!(batch_base(None, 1000, -3), Some(1000));
        assert_eq!(batch_base(None, 1000, 0), None);
        assert_eq!(batch_base(None, 1000, 3), None);
        assert!(USAGE.contains("!q -count"));
    }

    #[test]
    fn build_without_storage_succeeds() {
        let plugin = QuotePlugin.build(&PluginSpec::command("q")).unwrap();
        assert_eq!(plugin.id(), "q");
    }
}
