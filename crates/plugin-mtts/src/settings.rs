use serde::{Deserialize, Serialize};

/// Voice parameters, persisted as `mtts.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub short_name: String,
    pub style: String,
    pub rate: String,
    pub volume: String,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            short_name: "zh-CN-XiaoxiaoNeural".to_owned(),
            style: "general".to_owned(),
            rate: "+0%".to_owned(),
            volume: "+0%".to_owned(),
        }
    }
}
