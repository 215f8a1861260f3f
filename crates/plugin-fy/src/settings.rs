use serde::{Deserialize, Serialize};

/// Persisted translation preferences, stored as `fy.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FySettings {
    /// Always `auto`; kept in the file for compatibility.
    pub from_lang: String,
    pub to_lang: String,
    /// Chats whose outgoing messages get translated.
    pub translate_id: Vec<String>,
}

impl Default for FySettings {
    fn default() -> Self {
        Self {
            from_lang: "auto".to_owned(),
            to_lang: "en".to_owned(),
            translate_id: Vec::new(),
        }
    }
}

impl FySettings {
    #[must_use]
    pub fn is_enabled(&self, chat: &str) -> bool {
        self.translate_id.iter().any(|id| id == chat)
    }

    /// Flip `chat`; returns whether it is now enabled.
    pub fn toggle(&mut self, chat: &str) -> bool {
        if self.is_enabled(chat) {
            self.translate_id.retain(|id| id != chat);
            false
        } else {
            self.translate_id.push(chat.to_owned());
            true
        }
    }
}
