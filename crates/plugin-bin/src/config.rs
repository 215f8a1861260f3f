use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Binlist,
    Rapidapi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinConfig {
    pub provider: Provider,
    pub binlist_url: String,
    pub rapidapi_url: String,
    pub rapidapi_host: String,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    pub rates_url: String,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            binlist_url: "https://lookup.binlist.net".to_owned(),
            rapidapi_url: "https://bin-ip-checker.p.rapidapi.com/".to_owned(),
            rapidapi_host: "bin-ip-checker.p.rapidapi.com".to_owned(),
            api_key: None,
            api_key_env: "RAPIDAPI_KEY".to_owned(),
            rates_url: "https://api.exchangerate-api.com".to_owned(),
        }
    }
}

impl BinConfig {
    #[must_use]
    pub fn rapidapi_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}
