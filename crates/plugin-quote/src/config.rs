use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub api: ApiConfig,
    pub s3: S3Config,
    pub quote: QuoteSettings,
    pub media: MediaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub quote_api_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            quote_api_url: "https://quote.git.llc/generate".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket_name: String,
    /// Base URL objects are publicly reachable under, without trailing slash.
    pub public_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint_url: String,
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            public_url: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            endpoint_url: String::new(),
            region: "auto".to_owned(),
        }
    }
}

impl S3Config {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.bucket_name.is_empty()
            && !self.access_key.is_empty()
            && !self.secret_key.is_empty()
            && !self.endpoint_url.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSettings {
    pub background_color: String,
    pub width: u32,
    pub height: u32,
    pub scale: u32,
    pub emoji_brand: String,
    pub format: String,
    /// Upper bound on |offset| accepted from the command line.
    pub max_offset: u32,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            background_color: "#1b1429".to_owned(),
            width: 512,
            height: 768,
            scale: 2,
            emoji_brand: "apple".to_owned(),
            format: "webp".to_owned(),
            max_offset: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub max_file_size: usize,
    pub supported_formats: Vec<String>,
    /// Used for first-frame extraction when the image decoder cannot read
    /// the container (WEBM, MP4).
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            supported_formats: ["jpg", "jpeg", "png", "webp"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            ffmpeg_path: None,
        }
    }
}

impl MediaSettings {
    #[must_use]
    pub fn supports(&self, extension: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|f| f.trim().eq_ignore_ascii_case(extension))
    }
}
