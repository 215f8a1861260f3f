//! Platform-neutral view of the chat network.
//!
//! Plugins never talk to a chat SDK directly. The host process implements
//! [`ChatApi`] for its network and translates native events into
//! [`ChatMessage`] values, so plugin logic can be exercised against in-memory
//! fakes.

use core::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;

/// Per-chat sequential message number.
pub type MessageId = i64;

/// Opaque chat identifier as understood by the host.
pub type ChatId = String;

/// Opaque reference to a downloadable blob (media or avatar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHandle(pub String);

/// A user or channel as seen in a message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Numeric identity used for grouping and avatar colouring.
    pub id: i64,
    /// Host-level identity (e.g. a full user id), used for member lookups.
    pub handle: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Set for channels and group chats posting as themselves.
    pub title: Option<String>,
    pub username: Option<String>,
    pub emoji_status: Option<String>,
    pub is_deleted: bool,
    #[serde(skip)]
    pub photo: Option<MediaHandle>,
}

impl Peer {
    /// "First Last", falling back to the handle when both are missing.
    #[must_use]
    pub fn full_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.handle.clone()
        } else {
            name
        }
    }
}

/// Origin of a forwarded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    /// The original author hid their account; only a display name survives.
    HiddenSender { name: String },
    User(Peer),
    Channel(Peer),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Photo(MediaHandle),
    Sticker(MediaHandle),
    Animation(MediaHandle),
    Document {
        handle: MediaHandle,
        mime_type: Option<String>,
    },
    Video(MediaHandle),
    Audio(MediaHandle),
    Voice(MediaHandle),
}

impl Media {
    #[must_use]
    pub const fn handle(&self) -> &MediaHandle {
        match self {
            Self::Photo(h)
            | Self::Sticker(h)
            | Self::Animation(h)
            | Self::Video(h)
            | Self::Audio(h)
            | Self::Voice(h)
            | Self::Document { handle: h, .. } => h,
        }
    }

    /// Whether the media can be turned into a still image.
    #[must_use]
    pub fn is_image_like(&self) -> bool {
        match self {
            Self::Photo(_) | Self::Sticker(_) | Self::Animation(_) => true,
            Self::Document { mime_type, .. } => mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image/")),
            Self::Video(_) | Self::Audio(_) | Self::Voice(_) => false,
        }
    }

    #[must_use]
    pub const fn is_animation(&self) -> bool {
        matches!(self, Self::Animation(_))
    }
}

/// Formatting span over the message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_emoji_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    /// Direct sender: a user, or the chat itself for anonymous posts.
    pub from: Option<Peer>,
    pub forward: Option<Forward>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Vec<Entity>,
    pub media: Option<Media>,
    pub reply_to: Option<MessageId>,
    /// Sent by the account the host is logged in as.
    pub outgoing: bool,
}

impl ChatMessage {
    /// Text, or caption for media messages.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.caption.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMember {
    pub user: Peer,
    #[serde(with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingText {
    Plain(String),
    Markdown(String),
    Html { plain: String, html: String },
}

impl OutgoingText {
    #[must_use]
    pub fn as_plain(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Markdown(s) | Self::Html { plain: s, .. } => s,
        }
    }
}

impl From<String> for OutgoingText {
    fn from(value: String) -> Self {
        Self::Plain(value)
    }
}

impl From<&str> for OutgoingText {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Voice,
    Document,
    Animation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub kind: FileKind,
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Primitives the host chat client offers to plugins.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `Ok(None)` when the message is unknown, deleted or out of reach.
    async fn get_message(&self, chat: &str, id: MessageId) -> Result<Option<ChatMessage>>;

    async fn download(&self, handle: &MediaHandle) -> Result<Vec<u8>>;

    async fn edit_text(&self, chat: &str, id: MessageId, text: OutgoingText) -> Result<()>;

    async fn send_text(
        &self,
        chat: &str,
        text: OutgoingText,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn send_file(
        &self,
        chat: &str,
        file: OutgoingFile,
        reply_to: Option<MessageId>,
    ) -> Result<()>;

    async fn delete_message(&self, chat: &str, id: MessageId) -> Result<()>;

    async fn chat_member(&self, chat: &str, user: &Peer) -> Result<Option<ChatMember>>;

    async fn chat_members(&self, chat: &str) -> Result<Vec<ChatMember>>;

    /// Whether `chat` is a group rather than a one-to-one conversation.
    async fn is_group(&self, chat: &str) -> Result<bool> {
        Ok(self.chat_members(chat).await?.len() > 2)
    }
}

/// Deterministic numeric id derived from a name.
///
/// Distinct names may collide; callers only use this for visual grouping.
#[must_use]
pub fn stable_id(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    // Keep ids positive so they read like real account ids.
    i64::from_be_bytes(bytes) & i64::MAX
}

/// Delay before auto-deleting short-lived status replies.
pub const FLASH_DELAY: Duration = Duration::from_secs(5);
