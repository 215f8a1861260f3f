use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MttsConfig {
    /// Azure Speech resource region, e.g. `eastus`.
    pub region: String,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    pub output_format: String,
}

impl Default for MttsConfig {
    fn default() -> Self {
        Self {
            region: "eastus".to_owned(),
            api_key: None,
            api_key_env: "AZURE_SPEECH_KEY".to_owned(),
            output_format: "audio-24khz-48kbitrate-mono-mp3".to_owned(),
        }
    }
}

impl MttsConfig {
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }

    #[must_use]
    pub fn voices_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/voices/list",
            self.region
        )
    }

    #[must_use]
    pub fn synthesis_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }
}
