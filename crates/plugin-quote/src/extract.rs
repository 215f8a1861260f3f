//! Per-message normalization for the quote batch.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use plugin_core::{ChatApi, ChatMessage, Entity, Forward, Peer, stable_id};
use tracing::{debug, warn};

use crate::media::MediaPipeline;

pub const DELETED_ACCOUNT: &str = "Deleted Account";
pub const UNKNOWN_NAME: &str = "Unknown";
pub const MEDIA_PLACEHOLDER: &str = "[media]";

/// An uploaded image the render service can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub url: String,
    /// Object key, kept until cleanup.
    pub key: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub emoji_status: Option<String>,
    /// Base64 avatar image.
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySummary {
    pub name: String,
    pub text: String,
    pub entities: Vec<Entity>,
    /// Effective sender id of the replied-to message.
    pub chat_id: i64,
    pub media: Option<MediaReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub sender: Sender,
    pub text: String,
    pub entities: Vec<Entity>,
    pub media: Option<MediaReference>,
    pub reply: Option<ReplySummary>,
}

impl NormalizedMessage {
    /// Storage keys owned by this record, nested reply included.
    pub fn storage_keys(&self) -> impl Iterator<Item = &str> {
        self.media
            .iter()
            .chain(self.reply.iter().filter_map(|r| r.media.as_ref()))
            .map(|m| m.key.as_str())
    }
}

enum Origin<'a> {
    Hidden(&'a str),
    Peer(&'a Peer),
}

/// Forwarded origin first, then the direct sender.
fn effective_origin(msg: &ChatMessage) -> Option<Origin<'_>> {
    match &msg.forward {
        Some(Forward::HiddenSender { name }) if !name.is_empty() => {
            return Some(Origin::Hidden(name));
        }
        Some(Forward::User(peer) | Forward::Channel(peer)) => return Some(Origin::Peer(peer)),
        Some(Forward::HiddenSender { .. }) | None => {}
    }
    msg.from.as_ref().map(Origin::Peer)
}

#[must_use]
pub fn display_name(peer: &Peer) -> String {
    if peer.is_deleted {
        return DELETED_ACCOUNT.to_owned();
    }
    if let Some(title) = peer.title.as_deref().filter(|t| !t.is_empty()) {
        return title.to_owned();
    }
    let name = [peer.first_name.as_deref(), peer.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        UNKNOWN_NAME.to_owned()
    } else {
        name
    }
}

pub struct Extractor<'a> {
    pub chat: &'a dyn ChatApi,
    pub media: MediaPipeline<'a>,
}

impl core::fmt::Debug for Extractor<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Extractor")
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

impl Extractor<'_> {
    /// Build the record for `msg`, or `None` when it has no resolvable
    /// sender or nothing renderable.
    pub async fn extract(&self, msg: &ChatMessage) -> Option<NormalizedMessage> {
        let Some(origin) = effective_origin(msg) else {
            debug!(id = msg.id, "Skipping message without sender");
            return None;
        };
        let text = msg.body().unwrap_or_default().to_owned();
        let image = msg.media.as_ref().filter(|m| m.is_image_like());
        if text.is_empty() && image.is_none() {
            debug!(id = msg.id, "Skipping message without renderable content");
            return None;
        }

        let sender = self.sender(&origin).await;
        let mut record = NormalizedMessage {
            sender,
            text,
            entities: msg.entities.clone(),
            media: None,
            reply: None,
        };
        if let Some(media) = image {
            match self.media.process(media).await {
                Ok(reference) => record.media = Some(reference),
                Err(err) => {
                    warn!(id = msg.id, error = %err, "Media degraded to placeholder");
                    record.text = err.placeholder();
                    record.entities.clear();
                }
            }
        }
        Some(record)
    }

    /// Short form of `target` shown above a quoted message.
    pub async fn reply_summary(&self, target: &ChatMessage) -> Option<ReplySummary> {
        let origin = effective_origin(target)?;
        let (name, chat_id) = match origin {
            Origin::Hidden(name) => (name.to_owned(), stable_id(name)),
            Origin::Peer(peer) => (display_name(peer), peer.id),
        };

        let mut text = target.body().unwrap_or_default().to_owned();
        let mut entities = target.entities.clone();
        let mut media = None;
        if let Some(attached) = target.media.as_ref().filter(|m| m.is_image_like()) {
            match self.media.process(attached).await {
                Ok(reference) => media = Some(reference),
                Err(err) => {
                    warn!(id = target.id, error = %err, "Reply media degraded to placeholder");
                    text = err.placeholder();
                    entities.clear();
                }
            }
        }

        if text.is_empty() {
            target.media.as_ref()?;
            text = MEDIA_PLACEHOLDER.to_owned();
        }

        Some(ReplySummary {
            name,
            text,
            entities,
            chat_id,
            media,
        })
    }

    async fn sender(&self, origin: &Origin<'_>) -> Sender {
        match *origin {
            Origin::Hidden(name) => Sender {
                id: stable_id(name),
                name: name.to_owned(),
                username: String::new(),
                emoji_status: None,
                avatar: None,
            },
            Origin::Peer(peer) => Sender {
                id: peer.id,
                name: display_name(peer),
                username: peer.username.clone().unwrap_or_default(),
                emoji_status: peer.emoji_status.clone(),
                avatar: if peer.is_deleted {
                    None
                } else {
                    self.avatar(peer).await
                },
            },
        }
    }

    async fn avatar(&self, peer: &Peer) -> Option<String> {
        let handle = peer.photo.as_ref()?;
        match self.chat.download(handle).await {
            Ok(bytes) if !bytes.is_empty() => Some(STANDARD.encode(bytes)),
            Ok(_) => None,
            Err(err) => {
                debug!(peer = peer.id, error = %err, "Avatar download failed");
                None
            }
        }
    }
}
