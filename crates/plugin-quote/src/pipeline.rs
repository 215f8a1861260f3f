//! One `q` invocation: fetch, extract, render, send, clean up.

use plugin_core::{ChatApi, ChatMessage, FileKind, MessageId, OutgoingFile};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    args::QuoteArgs,
    config::{MediaSettings, QuoteSettings},
    extract::{Extractor, NormalizedMessage},
    media::MediaPipeline,
    range::resolve_ids,
    render::{QuoteRenderer, build_request},
    storage::ObjectStore,
};

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("No messages found")]
    NoMessages,
    #[error("Nothing to quote in the selected messages")]
    NothingToRender,
    #[error("Quote generation failed: {0}")]
    Render(String),
    #[error("Failed to send quote: {0}")]
    Send(String),
}

#[derive(Debug)]
pub struct QuoteJob<'a> {
    pub chat_id: &'a str,
    pub base: MessageId,
    /// The command message. Neither it nor our own replies to it (status
    /// notices) are part of the batch.
    pub skip: Option<MessageId>,
    pub args: &'a QuoteArgs,
    /// Message the finished image replies to.
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteReport {
    pub fetched: usize,
    pub rendered: usize,
    pub cleaned: usize,
    pub leftover: usize,
}

pub struct QuotePipeline<'a> {
    pub chat: &'a dyn ChatApi,
    pub store: Option<&'a dyn ObjectStore>,
    pub renderer: &'a dyn QuoteRenderer,
    pub quote: &'a QuoteSettings,
    pub media: &'a MediaSettings,
}

impl core::fmt::Debug for QuotePipeline<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuotePipeline")
            .field("has_store", &self.store.is_some())
            .field("quote", &self.quote)
            .finish_non_exhaustive()
    }
}

impl QuotePipeline<'_> {
    /// # Errors
    ///
    /// Returns a [`QuoteError`] whose message is shown to the user. Uploaded
    /// objects are only removed once the image has been sent.
    pub async fn run(&self, job: &QuoteJob<'_>) -> Result<QuoteReport, QuoteError> {
        let messages = self.fetch(job).await;
        if messages.is_empty() {
            return Err(QuoteError::NoMessages);
        }

        let extractor = Extractor {
            chat: self.chat,
            media: MediaPipeline {
                chat: self.chat,
                store: self.store,
                settings: self.media,
            },
        };

        let mut records = Vec::with_capacity(messages.len());
        for msg in &messages {
            let Some(mut record) = extractor.extract(msg).await else {
                continue;
            };
            if job.args.include_replies
                && let Some(target_id) = msg.reply_to
                && let Some(target) = self.fetch_one(job.chat_id, target_id).await
            {
                record.reply = extractor.reply_summary(&target).await;
            }
            records.push(record);
        }
        if records.is_empty() {
            return Err(QuoteError::NothingToRender);
        }

        let keys: Vec<String> = records
            .iter()
            .flat_map(NormalizedMessage::storage_keys)
            .map(ToOwned::to_owned)
            .collect();

        let request = build_request(&records, self.quote, &job.args.background_color);
        let image = self
            .renderer
            .render(&request)
            .await
            .map_err(|e| QuoteError::Render(format!("{e:#}")))?;
        drop(records);

        self.chat
            .send_file(job.chat_id, quote_file(&self.quote.format, image), job.reply_to)
            .await
            .map_err(|e| QuoteError::Send(format!("{e:#}")))?;

        let cleaned = self.cleanup(&keys).await;
        let report = QuoteReport {
            fetched: messages.len(),
            rendered: request.messages.len(),
            cleaned,
            leftover: keys.len() - cleaned,
        };
        info!(chat = %job.chat_id, ?report, "Quote sent");
        Ok(report)
    }

    async fn fetch(&self, job: &QuoteJob<'_>) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        for id in resolve_ids(job.base, job.args.offset) {
            if Some(id) == job.skip {
                continue;
            }
            let Some(msg) = self.fetch_one(job.chat_id, id).await else {
                continue;
            };
            if msg.outgoing && job.skip.is_some() && msg.reply_to == job.skip {
                debug!(chat = %job.chat_id, id, "Skipping status notice of the command");
                continue;
            }
            out.push(msg);
        }
        out
    }

    async fn fetch_one(&self, chat_id: &str, id: MessageId) -> Option<ChatMessage> {
        match self.chat.get_message(chat_id, id).await {
            Ok(found) => {
                if found.is_none() {
                    debug!(chat = %chat_id, id, "Message not available");
                }
                found
            }
            Err(err) => {
                debug!(chat = %chat_id, id, error = %err, "Fetching message failed");
                None
            }
        }
    }

    /// Delete every key independently; returns how many succeeded.
    async fn cleanup(&self, keys: &[String]) -> usize {
        let Some(store) = self.store else {
            return 0;
        };
        let mut cleaned = 0;
        for key in keys {
            match store.delete(key).await {
                Ok(()) => cleaned += 1,
                Err(err) => warn!(key = %key, error = %err, "Failed to delete quote media"),
            }
        }
        cleaned
    }
}

fn quote_file(format: &str, data: Vec<u8>) -> OutgoingFile {
    let format = format.trim().to_lowercase();
    let kind = if format == "webp" {
        FileKind::Animation
    } else {
        FileKind::Document
    };
    let mime_type = match format.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_owned(),
        other => format!("image/{other}"),
    };
    OutgoingFile {
        kind,
        file_name: format!("quote.{format}"),
        mime_type,
        data,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Cursor, sync::Mutex};

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use plugin_core::{ChatMember, Forward, Media, MediaHandle, OutgoingText, Peer, stable_id};
    use serde_json::json;

    use super::*;
    use crate::{
        extract::{DELETED_ACCOUNT, MEDIA_PLACEHOLDER},
        render::{RenderRequest, decode_response},
    };

    const CHAT: &str = "!room:example.org";

    #[derive(Default)]
    struct FakeChat {
        messages: HashMap<MessageId, ChatMessage>,
        blobs: HashMap<String, Vec<u8>>,
        downloads: Mutex<Vec<String>>,
        sent: Mutex<Vec<(OutgoingFile, Option<MessageId>)>>,
    }

    impl FakeChat {
        fn with(mut self, msg: ChatMessage) -> Self {
            self.messages.insert(msg.id, msg);
            self
        }

        fn blob(mut self, handle: &str, data: Vec<u8>) -> Self {
            self.blobs.insert(handle.to_owned(), data);
            self
        }
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn get_message(&self, _chat: &str, id: MessageId) -> Result<Option<ChatMessage>> {
            Ok(self.messages.get(&id).cloned())
        }

        async fn download(&self, handle: &MediaHandle) -> Result<Vec<u8>> {
            self.downloads.lock().unwrap().push(handle.0.clone());
            self.blobs
                .get(&handle.0)
                .cloned()
                .ok_or_else(|| anyhow!("no blob {}", handle.0))
        }

        async fn edit_text(&self, _chat: &str, _id: MessageId, _text: OutgoingText) -> Result<()> {
            Ok(())
        }

        async fn send_text(
            &self,
            _chat: &str,
            _text: OutgoingText,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageId> {
            Ok(0)
        }

        async fn send_file(
            &self,
            _chat: &str,
            file: OutgoingFile,
            reply_to: Option<MessageId>,
        ) -> Result<()> {
            self.sent.lock().unwrap().push((file, reply_to));
            Ok(())
        }

        async fn delete_message(&self, _chat: &str, _id: MessageId) -> Result<()> {
            Ok(())
        }

        async fn chat_member(&self, _chat: &str, _user: &Peer) -> Result<Option<ChatMember>> {
            Ok(None)
        }

        async fn chat_members(&self, _chat: &str) -> Result<Vec<ChatMember>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        puts: Mutex<Vec<(String, String)>>,
        deletes: Mutex<Vec<String>>,
        fail_puts: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put(&self, key: &str, _data: &[u8], content_type: &str) -> Result<()> {
            if self.fail_puts {
                return Err(anyhow!("bucket on fire"));
            }
            self.puts
                .lock()
                .unwrap()
                .push((key.to_owned(), content_type.to_owned()));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.deletes.lock().unwrap().push(key.to_owned());
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://cdn.test/{key}")
        }
    }

    struct FakeRenderer {
        body: serde_json::Value,
        requests: Mutex<Vec<RenderRequest>>,
    }

    impl FakeRenderer {
        fn ok() -> Self {
            Self {
                body: json!({"ok": true, "result": {"image": STANDARD.encode(b"IMG")}}),
                requests: Mutex::default(),
            }
        }

        fn failing() -> Self {
            Self {
                body: json!({"ok": false, "error": "renderer down"}),
                requests: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<RenderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteRenderer for FakeRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(request.clone());
            decode_response(self.body.to_string().as_bytes())
        }
    }

    fn user(id: i64, name: &str) -> Peer {
        Peer {
            id,
            handle: format!("@{}:example.org", name.to_lowercase()),
            first_name: Some(name.to_owned()),
            username: Some(name.to_lowercase()),
            ..Peer::default()
        }
    }

    fn text(id: MessageId, from: Peer, body: &str) -> ChatMessage {
        ChatMessage {
            id,
            chat_id: CHAT.to_owned(),
            from: Some(from),
            text: Some(body.to_owned()),
            ..ChatMessage::default()
        }
    }

    fn with_media(id: MessageId, from: Peer, media: Media) -> ChatMessage {
        ChatMessage {
            id,
            chat_id: CHAT.to_owned(),
            from: Some(from),
            media: Some(media),
            ..ChatMessage::default()
        }
    }

    fn image_bytes(format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 3, Rgba([10, 200, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn handle(name: &str) -> MediaHandle {
        MediaHandle(name.to_owned())
    }

    async fn run(
        chat: &FakeChat,
        store: Option<&FakeStore>,
        renderer: &FakeRenderer,
        media: &MediaSettings,
        base: MessageId,
        args: &QuoteArgs,
    ) -> Result<QuoteReport, QuoteError> {
        let quote = QuoteSettings::default();
        let pipeline = QuotePipeline {
            chat,
            store: store.map(|s| s as &dyn ObjectStore),
            renderer,
            quote: &quote,
            media,
        };
        pipeline
            .run(&QuoteJob {
                chat_id: CHAT,
                base,
                skip: Some(1000),
                args,
                reply_to: Some(base),
            })
            .await
    }

    fn args(offset: i64, include_replies: bool) -> QuoteArgs {
        QuoteArgs {
            offset,
            background_color: "#1b1429".to_owned(),
            include_replies,
        }
    }

    #[tokio::test]
    async fn single_text_message_renders_once_without_cleanup() {
        let chat = FakeChat::default().with(text(5, user(1, "Ann"), "hello"));
        let store = FakeStore::default();
        let renderer = FakeRenderer::ok();

        let report = run(&chat, Some(&store), &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap();

        let calls = renderer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].text, "hello");
        assert!(store.deletes.lock().unwrap().is_empty());
        assert_eq!(report.cleaned, 0);

        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.data, b"IMG");
        assert_eq!(sent[0].0.kind, FileKind::Animation);
        assert_eq!(sent[0].1, Some(5));
    }

    #[tokio::test]
    async fn failed_render_reports_and_skips_cleanup() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Photo(handle("p"))))
            .blob("p", image_bytes(ImageFormat::Png));
        let store = FakeStore::default();
        let renderer = FakeRenderer::failing();

        let err = run(&chat, Some(&store), &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteError::Render(_)));
        assert!(err.to_string().starts_with("Quote generation failed:"));
        assert!(err.to_string().contains("renderer down"));
        assert_eq!(store.puts.lock().unwrap().len(), 1);
        assert!(store.deletes.lock().unwrap().is_empty());
        assert!(chat.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn uploaded_media_is_deleted_after_send() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Photo(handle("p"))))
            .blob("p", image_bytes(ImageFormat::Png));
        let store = FakeStore::default();
        let renderer = FakeRenderer::ok();

        let report = run(&chat, Some(&store), &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap();

        let puts = store.puts.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].0.starts_with("media_") && puts[0].0.ends_with(".png"));
        assert_eq!(puts[0].1, "image/png");
        let media = renderer.calls()[0].messages[0].media.clone().unwrap();
        assert_eq!(media.url, format!("https://cdn.test/{}", puts[0].0));
        assert_eq!(media.kind, "image");
        assert_eq!(*store.deletes.lock().unwrap(), vec![puts[0].0.clone()]);
        assert_eq!((report.cleaned, report.leftover), (1, 0));
    }

    #[tokio::test]
    async fn animations_upload_a_jpeg_frame() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Animation(handle("g"))))
            .blob("g", image_bytes(ImageFormat::Gif));
        let store = FakeStore::default();
        let renderer = FakeRenderer::ok();

        run(&chat, Some(&store), &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap();

        let puts = store.puts.lock().unwrap().clone();
        assert!(puts[0].0.starts_with("frame_") && puts[0].0.ends_with(".jpg"));
        assert_eq!(puts[0].1, "image/jpeg");
    }

    #[tokio::test]
    async fn content_free_messages_never_reach_the_renderer() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Video(handle("v"))))
            .with(text(6, user(2, "Bob"), "still here"))
            .with(ChatMessage {
                id: 7,
                from: Some(user(3, "Cy")),
                ..ChatMessage::default()
            });
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(2, false))
            .await
            .unwrap();

        let calls = renderer.calls();
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].from.name, "Bob");
        assert!(chat.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_unrenderable_messages_is_an_error() {
        let chat = FakeChat::default().with(with_media(5, user(1, "Ann"), Media::Voice(handle("v"))));
        let renderer = FakeRenderer::ok();

        let err = run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::NothingToRender));
        assert!(renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_media_is_never_uploaded() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Photo(handle("big"))))
            .blob("big", vec![0xFF; 64]);
        let store = FakeStore::default();
        let renderer = FakeRenderer::ok();
        let media = MediaSettings {
            max_file_size: 16,
            ..MediaSettings::default()
        };

        run(&chat, Some(&store), &renderer, &media, 5, &args(0, false))
            .await
            .unwrap();

        assert!(store.puts.lock().unwrap().is_empty());
        let msg = &renderer.calls()[0].messages[0];
        assert_eq!(msg.text, "*Media file too large*");
        assert!(msg.media.is_none());
    }

    #[tokio::test]
    async fn media_failures_degrade_to_placeholders() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Photo(handle("junk"))))
            .with(with_media(6, user(1, "Ann"), Media::Photo(handle("png"))))
            .with(with_media(7, user(1, "Ann"), Media::Sticker(handle("gone"))))
            .blob("junk", b"definitely not an image".to_vec())
            .blob("png", image_bytes(ImageFormat::Png));
        let store = FakeStore {
            fail_puts: true,
            ..FakeStore::default()
        };
        let renderer = FakeRenderer::ok();

        run(&chat, Some(&store), &renderer, &MediaSettings::default(), 5, &args(2, false))
            .await
            .unwrap();

        let texts: Vec<_> = renderer.calls()[0]
            .messages
            .iter()
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(
            texts,
            vec![
                "*Unsupported media format: unknown*",
                "*Upload failed*",
                "*Media processing failed*",
            ]
        );
    }

    #[tokio::test]
    async fn missing_storage_is_reported_inline() {
        let chat = FakeChat::default()
            .with(with_media(5, user(1, "Ann"), Media::Photo(handle("p"))))
            .blob("p", image_bytes(ImageFormat::Png));
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap();

        assert_eq!(
            renderer.calls()[0].messages[0].text,
            "*Object storage not configured*"
        );
    }

    #[tokio::test]
    async fn missing_ids_and_the_command_are_skipped() {
        let chat = FakeChat::default()
            .with(text(1000, user(9, "Me"), "!q 3"))
            .with(text(1001, user(1, "Ann"), "one"))
            .with(text(1003, user(2, "Bob"), "three"));
        let renderer = FakeRenderer::ok();

        let report = run(&chat, None, &renderer, &MediaSettings::default(), 1000, &args(3, false))
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        let texts: Vec<_> = renderer.calls()[0]
            .messages
            .iter()
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(texts, vec!["one", "three"]);
    }

    #[tokio::test]
    async fn status_notice_for_the_command_is_not_quoted() {
        let notice = ChatMessage {
            reply_to: Some(1000),
            outgoing: true,
            ..text(1001, user(9, "Bot"), "Generating quote…")
        };
        let own_reply = ChatMessage {
            reply_to: Some(999),
            outgoing: true,
            ..text(1002, user(9, "Bot"), "kept")
        };
        let chat = FakeChat::default()
            .with(text(998, user(1, "Ann"), "a"))
            .with(text(999, user(2, "Bob"), "b"))
            .with(text(1000, user(3, "Cy"), "!q 5"))
            .with(notice)
            .with(own_reply);
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 998, &args(5, false))
            .await
            .unwrap();

        let calls = renderer.calls();
        let texts: Vec<_> = calls[0].messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "kept"]);
    }

    #[tokio::test]
    async fn negative_offset_walks_backwards_excluding_base() {
        let chat = FakeChat::default()
            .with(text(8, user(1, "Ann"), "eight"))
            .with(text(9, user(1, "Ann"), "nine"))
            .with(text(10, user(1, "Ann"), "ten"));
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 10, &args(-2, false))
            .await
            .unwrap();

        let calls = renderer.calls();
        let texts: Vec<_> = calls[0].messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["eight", "nine"]);
        assert!(calls[0].messages[0].avatar);
        assert!(!calls[0].messages[1].avatar);
        assert_eq!(calls[0].messages[1].from.name, "");
    }

    #[tokio::test]
    async fn empty_range_is_no_messages() {
        let chat = FakeChat::default();
        let renderer = FakeRenderer::ok();
        let err = run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::NoMessages));
    }

    #[tokio::test]
    async fn replies_are_summarized_when_requested() {
        let mut quoted = text(6, user(1, "Ann"), "look at this");
        quoted.reply_to = Some(5);
        let chat = FakeChat::default()
            .with(with_media(5, user(2, "Bob"), Media::Video(handle("v"))))
            .with(quoted);

        let renderer = FakeRenderer::ok();
        run(&chat, None, &renderer, &MediaSettings::default(), 6, &args(0, true))
            .await
            .unwrap();
        let reply = renderer.calls()[0].messages[0].reply_message.clone().unwrap();
        assert_eq!(reply.name, "Bob");
        assert_eq!(reply.text, MEDIA_PLACEHOLDER);
        assert_eq!(reply.chat_id, 2);

        let renderer = FakeRenderer::ok();
        run(&chat, None, &renderer, &MediaSettings::default(), 6, &args(0, false))
            .await
            .unwrap();
        assert!(renderer.calls()[0].messages[0].reply_message.is_none());
    }

    #[tokio::test]
    async fn reply_media_is_cleaned_up_too() {
        let mut quoted = text(6, user(1, "Ann"), "nice pic");
        quoted.reply_to = Some(5);
        let chat = FakeChat::default()
            .with(with_media(5, user(2, "Bob"), Media::Photo(handle("p"))))
            .with(quoted)
            .blob("p", image_bytes(ImageFormat::Png));
        let store = FakeStore::default();
        let renderer = FakeRenderer::ok();

        let report = run(&chat, Some(&store), &renderer, &MediaSettings::default(), 6, &args(0, true))
            .await
            .unwrap();

        assert_eq!(report.cleaned, 1);
        let reply = renderer.calls()[0].messages[0].reply_message.clone().unwrap();
        assert!(reply.media.is_some());
        assert_eq!(reply.text, MEDIA_PLACEHOLDER);
    }

    #[tokio::test]
    async fn hidden_forwards_use_a_stable_surrogate() {
        let chat = FakeChat::default().with(ChatMessage {
            id: 5,
            from: Some(user(1, "Ann")),
            forward: Some(Forward::HiddenSender {
                name: "Mystery".to_owned(),
            }),
            text: Some("psst".to_owned()),
            ..ChatMessage::default()
        });
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(0, false))
            .await
            .unwrap();

        let from = renderer.calls()[0].messages[0].from.clone();
        assert_eq!(from.name, "Mystery");
        assert_eq!(from.id, stable_id("Mystery"));
        assert!(from.photo.base64.is_none());
    }

    #[tokio::test]
    async fn deleted_accounts_skip_avatar_download() {
        let mut ghost = user(4, "Gone");
        ghost.is_deleted = true;
        ghost.photo = Some(handle("avatar-4"));
        let mut alive = user(5, "Here");
        alive.photo = Some(handle("avatar-5"));
        let chat = FakeChat::default()
            .with(text(5, ghost, "boo"))
            .with(text(6, alive, "hi"))
            .blob("avatar-4", b"A4".to_vec())
            .blob("avatar-5", b"A5".to_vec());
        let renderer = FakeRenderer::ok();

        run(&chat, None, &renderer, &MediaSettings::default(), 5, &args(1, false))
            .await
            .unwrap();

        let calls = renderer.calls();
        assert_eq!(calls[0].messages[0].from.name, DELETED_ACCOUNT);
        assert!(calls[0].messages[0].from.photo.base64.is_none());
        assert_eq!(
            calls[0].messages[1].from.photo.base64.as_deref(),
            Some(STANDARD.encode(b"A5").as_str())
        );
        assert_eq!(*chat.downloads.lock().unwrap(), vec!["avatar-5".to_owned()]);
    }

    #[test]
    fn non_webp_output_is_a_document() {
        let file = quote_file("PNG", vec![1]);
        assert_eq!(file.kind, FileKind::Document);
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.file_name, "quote.png");
        assert_eq!(quote_file("jpg", Vec::new()).mime_type, "image/jpeg");
    }
}
