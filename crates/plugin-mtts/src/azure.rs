//! Azure Speech REST calls: voice catalogue and SSML synthesis.

use anyhow::{Context as _, Result, bail};
use plugin_core::escape_html;
use serde::Deserialize;

use crate::{config::MttsConfig, settings::TtsSettings};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    pub short_name: String,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub locale_name: String,
}

impl Voice {
    fn matches(&self, tag: &str) -> bool {
        self.short_name.contains(tag)
            || self.local_name.contains(tag)
            || self.locale_name.contains(tag)
    }
}

/// Table of voices whose names or locale contain `tag`, header first.
#[must_use]
pub fn voice_table(voices: &[Voice], tag: &str) -> String {
    let mut out = String::from("ShortName | LocalName | Gender | LocaleName");
    for v in voices.iter().filter(|v| v.matches(tag)) {
        out.push('\n');
        out.push_str(&format!(
            "{} | {} | {} | {}",
            v.short_name, v.local_name, v.gender, v.locale_name
        ));
    }
    out
}

/// `zh-CN-XiaoxiaoNeural` -> `zh-CN`.
fn locale_of(short_name: &str) -> &str {
    let mut parts = short_name.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lang), Some(region), Some(_)) => &short_name[..lang.len() + 1 + region.len()],
        _ => "en-US",
    }
}

#[must_use]
pub fn build_ssml(settings: &TtsSettings, text: &str) -> String {
    let prosody = format!(
        "<prosody rate=\"{}\" volume=\"{}\">{}</prosody>",
        escape_html(&settings.rate),
        escape_html(&settings.volume),
        escape_html(text)
    );
    let body = if settings.style.is_empty() || settings.style == "general" {
        prosody
    } else {
        format!(
            "<mstts:express-as style=\"{}\">{prosody}</mstts:express-as>",
            escape_html(&settings.style)
        )
    };
    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" \
         xmlns:mstts=\"https://www.w3.org/2001/mstts\" xml:lang=\"{}\">\
         <voice name=\"{}\">{body}</voice></speak>",
        locale_of(&settings.short_name),
        escape_html(&settings.short_name)
    )
}

#[derive(Debug, Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
    config: MttsConfig,
}

impl SpeechClient {
    #[must_use]
    pub const fn new(client: reqwest::Client, config: MttsConfig) -> Self {
        Self { client, config }
    }

    fn key(&self) -> Result<String> {
        match self.config.key() {
            Some(key) => Ok(key),
            None => bail!(
                "speech key missing: set api_key or {}",
                self.config.api_key_env
            ),
        }
    }

    /// # Errors
    ///
    /// Transport failures, non-success status or an unparseable list.
    pub async fn voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(self.config.voices_url())
            .header("Ocp-Apim-Subscription-Key", self.key()?)
            .send()
            .await
            .context("requesting voice list")?
            .error_for_status()
            .context("voice list status")?;
        response.json().await.context("decoding voice list")
    }

    /// Synthesize `text` with `settings`, returning encoded audio.
    ///
    /// # Errors
    ///
    /// Transport failures, non-success status or an empty body.
    pub async fn synthesize(&self, settings: &TtsSettings, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.config.synthesis_url())
            .header("Ocp-Apim-Subscription-Key", self.key()?)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.config.output_format)
            .body(build_ssml(settings, text))
            .send()
            .await
            .context("requesting synthesis")?
            .error_for_status()
            .context("synthesis status")?;
        let audio = response.bytes().await.context("reading audio")?;
        if audio.is_empty() {
            bail!("speech service returned no audio");
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(short: &str, local: &str, locale: &str) -> Voice {
        Voice {
            short_name: short.to_owned(),
            local_name: local.to_owned(),
            gender: "Female".to_owned(),
            locale_name: locale.to_owned(),
        }
    }

    #[test]
    fn general_style_has_no_express_as() {
        let ssml = build_ssml(&TtsSettings::default(), "你好");
        assert!(ssml.contains("xml:lang=\"zh-CN\""));
        assert!(ssml.contains("<voice name=\"zh-CN-XiaoxiaoNeural\">"));
        assert!(ssml.contains("<prosody rate=\"+0%\" volume=\"+0%\">你好</prosody>"));
        assert!(!ssml.contains("express-as"));
    }

    #[test]
    fn custom_style_wraps_prosody_and_text_is_escaped() {
        let settings = TtsSettings {
            style: "cheerful".to_owned(),
            ..TtsSettings::default()
        };
        let ssml = build_ssml(&settings, "a < b & c");
        assert!(ssml.contains(
            "<mstts:express-as style=\"cheerful\"><prosody rate=\"+0%\" volume=\"+0%\">a &lt; b &amp; c</prosody></mstts:express-as>"
        ));
    }

    #[test]
    fn locale_comes_from_voice_name() {
        assert_eq!(locale_of("en-GB-SoniaNeural"), "en-GB");
        assert_eq!(locale_of("zh-CN-liaoning-XiaobeiNeural"), "zh-CN");
        assert_eq!(locale_of("odd"), "en-US");
    }

    #[test]
    fn table_filters_on_names_and_locale() {
        let voices = vec![
            voice("zh-CN-XiaoxiaoNeural", "晓晓", "Chinese (Mandarin, Simplified)"),
            voice("en-US-JennyNeural", "Jenny", "English (United States)"),
            voice("en-GB-SoniaNeural", "Sonia", "English (United Kingdom)"),
        ];
        let table = voice_table(&voices, "English");
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "ShortName | LocalName | Gender | LocaleName");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "en-US-JennyNeural | Jenny | Female | English (United States)");

        assert_eq!(voice_table(&voices, "晓").lines().count(), 2);
        assert_eq!(voice_table(&voices, "nothing").lines().count(), 1);
    }

    #[test]
    fn voice_list_json_decodes() {
        let body = r#"[{"Name":"Microsoft Server Speech Text to Speech Voice (en-US, JennyNeural)",
            "ShortName":"en-US-JennyNeural","Gender":"Female","Locale":"en-US",
            "LocalName":"Jenny","LocaleName":"English (United States)","StyleList":["chat"]}]"#;
        let voices: Vec<Voice> = serde_json::from_str(body).unwrap();
        assert_eq!(voices[0], voice("en-US-JennyNeural", "Jenny", "English (United States)"));
    }
}
