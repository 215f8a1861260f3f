use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FyConfig {
    /// DeepLX-compatible `/translate` endpoint.
    pub api_url: String,
    pub token: Option<String>,
    /// Outgoing messages starting with one of these are left alone.
    pub skip_prefixes: Vec<String>,
}

impl Default for FyConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.deeplx.org/translate".to_owned(),
            token: None,
            skip_prefixes: ["，", ",", "/", "-"].into_iter().map(ToOwned::to_owned).collect(),
        }
    }
}
