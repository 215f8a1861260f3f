use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use plugin_core::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::QuoteSettings,
    extract::{MediaReference, NormalizedMessage, ReplySummary},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub background_color: String,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    pub emoji_brand: String,
    pub messages: Vec<RenderMessage>,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderMessage {
    pub from: RenderSender,
    pub avatar: bool,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<RenderMedia>,
    #[serde(rename = "replyMessage", skip_serializing_if = "Option::is_none")]
    pub reply_message: Option<RenderReply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSender {
    pub id: i64,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji_status: Option<String>,
    pub photo: RenderPhoto,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderPhoto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderMedia {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&MediaReference> for RenderMedia {
    fn from(media: &MediaReference) -> Self {
        Self {
            url: media.url.clone(),
            kind: media.kind.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReply {
    pub name: String,
    pub text: String,
    pub entities: Vec<Entity>,
    #[serde(rename = "chatId")]
    pub chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<RenderMedia>,
}

impl From<&ReplySummary> for RenderReply {
    fn from(reply: &ReplySummary) -> Self {
        Self {
            name: reply.name.clone(),
            text: reply.text.clone(),
            entities: reply.entities.clone(),
            chat_id: reply.chat_id,
            media: reply.media.as_ref().map(RenderMedia::from),
        }
    }
}

/// Assemble the request body. Runs of messages from the same sender show the
/// header only on the first message.
#[must_use]
pub fn build_request(
    records: &[NormalizedMessage],
    settings: &QuoteSettings,
    background_color: &str,
) -> RenderRequest {
    let mut previous: Option<i64> = None;
    let messages = records
        .iter()
        .map(|record| {
            let continued = previous == Some(record.sender.id);
            previous = Some(record.sender.id);
            RenderMessage {
                from: RenderSender {
                    id: record.sender.id,
                    name: if continued {
                        String::new()
                    } else {
                        record.sender.name.clone()
                    },
                    username: if continued {
                        String::new()
                    } else {
                        record.sender.username.clone()
                    },
                    emoji_status: record.sender.emoji_status.clone(),
                    photo: RenderPhoto {
                        base64: if continued {
                            None
                        } else {
                            record.sender.avatar.clone()
                        },
                    },
                },
                avatar: !continued,
                text: record.text.clone(),
                entities: record.entities.clone(),
                media: record.media.as_ref().map(RenderMedia::from),
                reply_message: record.reply.as_ref().map(RenderReply::from),
            }
        })
        .collect();

    RenderRequest {
        background_color: background_color.to_owned(),
        width: settings.width,
        height: settings.height,
        scale: settings.scale,
        emoji_brand: settings.emoji_brand.clone(),
        messages,
        format: settings.format.clone(),
    }
}

#[async_trait]
pub trait QuoteRenderer: Send + Sync {
    /// Returns the decoded image bytes.
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    url: String,
}

impl HttpRenderer {
    #[must_use]
    pub const fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl QuoteRenderer for HttpRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {}", self.url))?;
        let status = response.status();
        let body = response.bytes().await.context("reading render response")?;
        if !status.is_success() {
            bail!(
                "render service returned {status}: {}",
                plugin_core::truncate(&String::from_utf8_lossy(&body), 200)
            );
        }
        decode_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    ok: Value,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    result: Option<RenderResult>,
}

#[derive(Debug, Deserialize)]
struct RenderResult {
    image: String,
}

/// Parse `{"ok": true, "result": {"image": <base64>}}` into image bytes.
///
/// # Errors
///
/// Fails when `ok` is not truthy or the image is missing or malformed.
pub fn decode_response(body: &[u8]) -> Result<Vec<u8>> {
    let parsed: RenderResponse =
        serde_json::from_slice(body).context("render response is not JSON")?;
    if !is_truthy(&parsed.ok) {
        let detail = parsed
            .error
            .map_or_else(
                || "no ok flag".to_owned(),
                |e| e.as_str().map_or_else(|| e.to_string(), ToOwned::to_owned),
            );
        return Err(anyhow!("render service reported failure: {detail}"));
    }
    let result = parsed.result.context("render response has no result")?;
    STANDARD
        .decode(result.image.trim())
        .context("render image is not valid base64")
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > f64::EPSILON),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::extract::Sender;

    fn record(id: i64, name: &str, text: &str) -> NormalizedMessage {
        NormalizedMessage {
            sender: Sender {
                id,
                name: name.to_owned(),
                username: name.to_lowercase(),
                emoji_status: None,
                avatar: Some("YXZhdGFy".to_owned()),
            },
            text: text.to_owned(),
            entities: Vec::new(),
            media: None,
            reply: None,
        }
    }

    #[test]
    fn consecutive_senders_are_grouped() {
        let records = [
            record(1, "Ann", "a"),
            record(1, "Ann", "b"),
            record(2, "Bob", "c"),
            record(1, "Ann", "d"),
            record(1, "Ann", "e"),
        ];
        let req = build_request(&records, &QuoteSettings::default(), "#000");
        let headers: Vec<_> = req
            .messages
            .iter()
            .map(|m| (m.avatar, m.from.name.as_str(), m.from.photo.base64.is_some()))
            .collect();
        assert_eq!(
            headers,
            vec![
                (true, "Ann", true),
                (false, "", false),
                (true, "Bob", true),
                (true, "Ann", true),
                (false, "", false),
            ]
        );
        assert_eq!(req.messages[1].from.username, "");
        assert_eq!(req.messages[1].from.id, 1);
    }

    #[test]
    fn request_serializes_with_wire_names() {
        let mut rec = record(7, "Ann", "hi");
        rec.reply = Some(ReplySummary {
            name: "Bob".to_owned(),
            text: "[media]".to_owned(),
            entities: Vec::new(),
            chat_id: 9,
            media: None,
        });
        let req = build_request(&[rec], &QuoteSettings::default(), "red");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["backgroundColor"], "red");
        assert_eq!(value["emojiBrand"], "apple");
        assert_eq!(value["width"], 512);
        assert_eq!(value["format"], "webp");
        let msg = &value["messages"][0];
        assert_eq!(msg["from"]["photo"]["base64"], "YXZhdGFy");
        assert_eq!(msg["replyMessage"]["chatId"], 9);
        assert_eq!(msg["replyMessage"]["text"], "[media]");
        assert!(msg.get("media").is_none());
    }

    #[test]
    fn decodes_successful_response() {
        let body = json!({"ok": true, "result": {"image": STANDARD.encode(b"png!")}});
        let image = decode_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(image, b"png!");
    }

    #[test]
    fn falsy_ok_is_a_failure() {
        for body in [
            json!({"ok": false, "error": "boom", "result": {"image": "aGk="}}),
            json!({"result": {"image": "aGk="}}),
            json!({"ok": 0}),
        ] {
            assert!(decode_response(body.to_string().as_bytes()).is_err());
        }
        assert!(decode_response(b"<html>").is_err());
    }
}
