//! [`ChatApi`] backed by a matrix-sdk client.

use std::collections::HashMap;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use matrix_sdk::{
    Client, RoomMemberships,
    attachment::AttachmentConfig,
    deserialized_responses::MemberEvent,
    media::{MediaFormat, MediaRequestParameters},
    room::{
        Room, RoomMember,
        reply::{EnforceThread, Reply},
    },
    ruma::{
        EventId, OwnedEventId, RoomId, UserId,
        events::{
            relation::{InReplyTo, Replacement},
            room::{
                MediaSource,
                message::{
                    FormattedBody, MessageFormat, MessageType, OriginalSyncRoomMessageEvent,
                    Relation, RoomMessageEventContent, RoomMessageEventContentWithoutRelation,
                },
            },
        },
    },
};
use mime::Mime;
use plugin_core::{
    ChatApi, ChatMember, ChatMessage, Entity, Media, MediaHandle, MessageId, OutgoingFile,
    OutgoingText, Peer, stable_id,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{formatting::html_to_entities, timeline::TimelineIndex};

pub struct MatrixChat {
    client: Client,
    timeline: Mutex<TimelineIndex>,
    /// Status notices standing in for edits of messages we do not own.
    notices: Mutex<HashMap<(String, MessageId), OwnedEventId>>,
}

impl core::fmt::Debug for MatrixChat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MatrixChat")
            .field("user_id", &self.client.user_id())
            .finish_non_exhaustive()
    }
}

impl MatrixChat {
    #[must_use]
    pub fn new(client: Client, timeline_capacity: usize) -> Self {
        Self {
            client,
            timeline: Mutex::new(TimelineIndex::new(timeline_capacity)),
            notices: Mutex::new(HashMap::new()),
        }
    }

    /// Record a synced message and return it when it is new.
    ///
    /// Edits update the stored message and yield `None`, as do events this
    /// process sent itself.
    pub async fn ingest(
        &self,
        room: &Room,
        ev: &OriginalSyncRoomMessageEvent,
    ) -> Option<ChatMessage> {
        let chat = room.room_id().as_str();

        if let Some(Relation::Replacement(edit)) = &ev.content.relates_to {
            let (text, caption, entities) = message_parts(&edit.new_content.msgtype);
            let known = self
                .timeline
                .lock()
                .await
                .update(chat, edit.event_id.as_str(), |m| {
                    if text.is_some() {
                        m.text = text;
                        m.entities = entities;
                    }
                    if caption.is_some() {
                        m.caption = caption;
                    }
                });
            debug!(room_id = %chat, target = %edit.event_id, known, "Recorded edit");
            return None;
        }

        let from = peer(room, &ev.sender).await;
        let outgoing = self.client.user_id().is_some_and(|own| ev.sender == own);
        let (text, caption, entities) = message_parts(&ev.content.msgtype);
        let media = media_of(&ev.content.msgtype);

        let mut timeline = self.timeline.lock().await;
        let reply_to = reply_target(&ev.content).and_then(|e| timeline.id_of(chat, e.as_str()));
        let recorded = timeline.record(chat, ev.event_id.as_str(), |id| ChatMessage {
            id,
            chat_id: chat.to_owned(),
            from: Some(from),
            forward: None,
            text,
            caption,
            entities,
            media,
            reply_to,
            outgoing,
        });
        if !recorded.fresh {
            return None;
        }
        timeline.get(chat, recorded.id).cloned()
    }

    fn room(&self, chat: &str) -> Result<Room> {
        let room_id = RoomId::parse(chat).with_context(|| format!("invalid room id {chat}"))?;
        self.client
            .get_room(&room_id)
            .ok_or_else(|| anyhow!("not a member of {chat}"))
    }

    async fn event_id(&self, chat: &str, id: MessageId) -> Option<OwnedEventId> {
        let timeline = self.timeline.lock().await;
        timeline
            .event_of(chat, id)
            .and_then(|e| EventId::parse(e).ok())
    }

    /// Index something we just sent so its sync echo is not dispatched.
    async fn remember_sent(
        &self,
        room: &Room,
        event_id: &EventId,
        text: Option<String>,
        reply_to: Option<MessageId>,
    ) -> MessageId {
        let from = match self.client.user_id() {
            Some(own) => Some(peer(room, own).await),
            None => None,
        };
        let chat = room.room_id().as_str();
        self.timeline
            .lock()
            .await
            .record(chat, event_id.as_str(), |id| ChatMessage {
                id,
                chat_id: chat.to_owned(),
                from,
                text,
                reply_to,
                outgoing: true,
                ..ChatMessage::default()
            })
            .id
    }
}

#[async_trait]
impl ChatApi for MatrixChat {
    async fn get_message(&self, chat: &str, id: MessageId) -> Result<Option<ChatMessage>> {
        Ok(self.timeline.lock().await.get(chat, id).cloned())
    }

    async fn download(&self, handle: &MediaHandle) -> Result<Vec<u8>> {
        let source: MediaSource =
            serde_json::from_str(&handle.0).context("decoding media handle")?;
        let request = MediaRequestParameters {
            source,
            format: MediaFormat::File,
        };
        self.client
            .media()
            .get_media_content(&request, true)
            .await
            .context("downloading media")
    }

    async fn edit_text(&self, chat: &str, id: MessageId, text: OutgoingText) -> Result<()> {
        let room = self.room(chat)?;
        let (event_id, outgoing) = {
            let timeline = self.timeline.lock().await;
            let message = timeline
                .get(chat, id)
                .ok_or_else(|| anyhow!("message {id} is not in the timeline of {chat}"))?;
            let event_id = timeline
                .event_of(chat, id)
                .map(EventId::parse)
                .transpose()
                .context("stored event id")?
                .ok_or_else(|| anyhow!("message {id} has no event"))?;
            (event_id, message.outgoing)
        };

        if outgoing {
            room.send(replacement(event_id, content(text, false)))
                .await
                .context("editing message")?;
            return Ok(());
        }

        let key = (chat.to_owned(), id);
        let existing = self.notices.lock().await.get(&key).cloned();
        if let Some(notice) = existing {
            room.send(replacement(notice, content(text, true)))
                .await
                .context("updating status notice")?;
            return Ok(());
        }
        let plain = text.as_plain().to_owned();
        let mut notice = content(text, true);
        notice.relates_to = Some(Relation::Reply {
            in_reply_to: InReplyTo::new(event_id),
        });
        let response = room.send(notice).await.context("sending status notice")?;
        self.remember_sent(&room, &response.event_id, Some(plain), Some(id))
            .await;
        self.notices.lock().await.insert(key, response.event_id);
        Ok(())
    }

    async fn send_text(
        &self,
        chat: &str,
        text: OutgoingText,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let room = self.room(chat)?;
        let plain = text.as_plain().to_owned();
        let mut message = content(text, false);
        if let Some(target) = reply_to
            && let Some(event_id) = self.event_id(chat, target).await
        {
            message.relates_to = Some(Relation::Reply {
                in_reply_to: InReplyTo::new(event_id),
            });
        }
        let response = room.send(message).await.context("sending message")?;
        Ok(self
            .remember_sent(&room, &response.event_id, Some(plain), reply_to)
            .await)
    }

    async fn send_file(
        &self,
        chat: &str,
        file: OutgoingFile,
        reply_to: Option<MessageId>,
    ) -> Result<()> {
        let room = self.room(chat)?;
        let mime: Mime = file
            .mime_type
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);
        let mut config = AttachmentConfig::new();
        if let Some(target) = reply_to
            && let Some(event_id) = self.event_id(chat, target).await
        {
            config = config.reply(Some(Reply {
                event_id,
                enforce_thread: EnforceThread::MaybeThreaded,
            }));
        }
        debug!(room_id = %chat, kind = ?file.kind, bytes = file.data.len(), "Uploading attachment");
        let response = room
            .send_attachment(&file.file_name, &mime, file.data, config)
            .await
            .context("uploading attachment")?;
        self.remember_sent(&room, &response.event_id, None, reply_to)
            .await;
        Ok(())
    }

    async fn delete_message(&self, chat: &str, id: MessageId) -> Result<()> {
        let room = self.room(chat)?;
        let notice = self.notices.lock().await.remove(&(chat.to_owned(), id));
        if let Some(notice) = notice {
            room.redact(&notice, None, None)
                .await
                .context("redacting status notice")?;
            return Ok(());
        }

        let own = {
            let timeline = self.timeline.lock().await;
            timeline.get(chat, id).is_some_and(|m| m.outgoing)
        };
        if !own {
            debug!(room_id = %chat, id, "Leaving message we do not own");
            return Ok(());
        }
        let Some(event_id) = self.event_id(chat, id).await else {
            return Ok(());
        };
        room.redact(&event_id, None, None)
            .await
            .context("redacting message")?;
        self.timeline.lock().await.remove(chat, id);
        Ok(())
    }

    async fn chat_member(&self, chat: &str, user: &Peer) -> Result<Option<ChatMember>> {
        let room = self.room(chat)?;
        let user_id = UserId::parse(&user.handle)
            .with_context(|| format!("invalid user id {}", user.handle))?;
        let member = room
            .get_member(&user_id)
            .await
            .context("fetching member")?;
        Ok(member.as_ref().map(chat_member))
    }

    async fn chat_members(&self, chat: &str) -> Result<Vec<ChatMember>> {
        let room = self.room(chat)?;
        let members = room
            .members(RoomMemberships::JOIN)
            .await
            .context("listing members")?;
        Ok(members.iter().map(chat_member).collect())
    }

    /// Rooms flagged as direct chats, and rooms of two, are not groups.
    async fn is_group(&self, chat: &str) -> Result<bool> {
        let room = self.room(chat)?;
        let direct = room.is_direct().await.context("reading direct flag")?;
        Ok(!direct && room.joined_members_count() > 2)
    }
}

fn content(text: OutgoingText, notice: bool) -> RoomMessageEventContent {
    match (text, notice) {
        (OutgoingText::Plain(s), false) => RoomMessageEventContent::text_plain(s),
        (OutgoingText::Plain(s), true) => RoomMessageEventContent::notice_plain(s),
        (OutgoingText::Markdown(s), false) => RoomMessageEventContent::text_markdown(s),
        (OutgoingText::Markdown(s), true) => RoomMessageEventContent::notice_markdown(s),
        (OutgoingText::Html { plain, html }, false) => {
            RoomMessageEventContent::text_html(plain, html)
        }
        (OutgoingText::Html { plain, html }, true) => {
            RoomMessageEventContent::notice_html(plain, html)
        }
    }
}

fn replacement(target: OwnedEventId, new: RoomMessageEventContent) -> RoomMessageEventContent {
    let mut edit = RoomMessageEventContent::new(new.msgtype.clone());
    edit.relates_to = Some(Relation::Replacement(Replacement::new(
        target,
        RoomMessageEventContentWithoutRelation::new(new.msgtype),
    )));
    edit
}

fn reply_target(content: &RoomMessageEventContent) -> Option<&EventId> {
    match content.relates_to.as_ref()? {
        Relation::Reply { in_reply_to } => Some(&*in_reply_to.event_id),
        Relation::Thread(thread) => thread.in_reply_to.as_ref().map(|r| &*r.event_id),
        Relation::Replacement(_) | _ => None,
    }
}

/// Drop the `> quoted` block older clients prepend to replies.
fn strip_reply_fallback(body: &str) -> &str {
    if body.starts_with('>')
        && let Some((quoted, rest)) = body.split_once("\n\n")
        && quoted.lines().all(|l| l.starts_with('>'))
    {
        return rest;
    }
    body
}

/// Message text and media caption. A media body is a caption only when a
/// separate file name is present.
fn text_and_caption(msgtype: &MessageType) -> (Option<String>, Option<String>) {
    let caption = |body: &str, filename: Option<&String>| {
        filename
            .filter(|name| name.as_str() != body)
            .map(|_| body.to_owned())
    };
    match msgtype {
        MessageType::Text(t) => (Some(strip_reply_fallback(&t.body).to_owned()), None),
        MessageType::Notice(n) => (Some(strip_reply_fallback(&n.body).to_owned()), None),
        MessageType::Emote(e) => (Some(strip_reply_fallback(&e.body).to_owned()), None),
        MessageType::Image(i) => (None, caption(&i.body, i.filename.as_ref())),
        MessageType::File(f) => (None, caption(&f.body, f.filename.as_ref())),
        MessageType::Video(v) => (None, caption(&v.body, v.filename.as_ref())),
        MessageType::Audio(a) => (None, caption(&a.body, a.filename.as_ref())),
        MessageType::Location(_)
        | MessageType::ServerNotice(_)
        | MessageType::VerificationRequest(_)
        | _ => (None, None),
    }
}

fn html_body(msgtype: &MessageType) -> Option<&FormattedBody> {
    let formatted = match msgtype {
        MessageType::Text(t) => t.formatted.as_ref(),
        MessageType::Notice(n) => n.formatted.as_ref(),
        MessageType::Emote(e) => e.formatted.as_ref(),
        MessageType::Image(_) | MessageType::File(_) | MessageType::Video(_) | _ => None,
    }?;
    matches!(formatted.format, MessageFormat::Html).then_some(formatted)
}

/// Text, caption and formatting. HTML bodies supply both the text and its
/// entities; plain bodies carry none.
fn message_parts(msgtype: &MessageType) -> (Option<String>, Option<String>, Vec<Entity>) {
    let (text, caption) = text_and_caption(msgtype);
    if let Some(formatted) = html_body(msgtype) {
        let (plain, entities) = html_to_entities(&formatted.body);
        if !plain.trim().is_empty() {
            return (Some(plain), caption, entities);
        }
    }
    (text, caption, Vec::new())
}

fn handle_for(source: &MediaSource) -> Option<MediaHandle> {
    serde_json::to_string(source).ok().map(MediaHandle)
}

fn media_of(msgtype: &MessageType) -> Option<Media> {
    match msgtype {
        MessageType::Image(img) => {
            let handle = handle_for(&img.source)?;
            let mime = img.info.as_ref().and_then(|i| i.mimetype.as_deref());
            Some(if mime == Some("image/gif") {
                Media::Animation(handle)
            } else {
                Media::Photo(handle)
            })
        }
        MessageType::File(file) => Some(Media::Document {
            handle: handle_for(&file.source)?,
            mime_type: file.info.as_ref().and_then(|i| i.mimetype.clone()),
        }),
        MessageType::Video(video) => Some(Media::Video(handle_for(&video.source)?)),
        MessageType::Audio(audio) => Some(Media::Audio(handle_for(&audio.source)?)),
        MessageType::Emote(_)
        | MessageType::Location(_)
        | MessageType::Notice(_)
        | MessageType::ServerNotice(_)
        | MessageType::Text(_)
        | MessageType::VerificationRequest(_)
        | _ => None,
    }
}

async fn peer(room: &Room, user_id: &UserId) -> Peer {
    let member = room.get_member(user_id).await.ok().flatten();
    peer_from(user_id, member.as_ref())
}

fn peer_from(user_id: &UserId, member: Option<&RoomMember>) -> Peer {
    let display = member
        .and_then(|m| m.display_name())
        .unwrap_or_else(|| user_id.localpart());
    Peer {
        id: stable_id(user_id.as_str()),
        handle: user_id.to_string(),
        first_name: Some(display.to_owned()),
        username: Some(user_id.localpart().to_owned()),
        photo: member
            .and_then(|m| m.avatar_url())
            .and_then(|uri| handle_for(&MediaSource::Plain(uri.to_owned()))),
        ..Peer::default()
    }
}

fn chat_member(member: &RoomMember) -> ChatMember {
    let joined_at = match &**member.event() {
        MemberEvent::Sync(ev) => {
            OffsetDateTime::from_unix_timestamp(i64::from(ev.origin_server_ts().as_secs())).ok()
        }
        MemberEvent::Stripped(_) => None,
    };
    ChatMember {
        user: peer_from(member.user_id(), Some(member)),
        joined_at,
        status: member.membership().as_str().to_owned(),
    }
}
