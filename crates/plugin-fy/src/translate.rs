use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FyConfig;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<String>,
}

/// Translated text from a DeepLX-style body, if the call succeeded.
#[must_use]
pub fn parse_response(body: &[u8]) -> Option<String> {
    let parsed: TranslateResponse = serde_json::from_slice(body).ok()?;
    if parsed.code != 200 {
        return None;
    }
    parsed.data.filter(|d| !d.trim().is_empty())
}

/// `Ok(None)` when the service answered but refused; the caller stays quiet.
///
/// # Errors
///
/// Transport failures.
pub async fn translate(
    client: &reqwest::Client,
    cfg: &FyConfig,
    text: &str,
    from: &str,
    to: &str,
) -> Result<Option<String>> {
    let mut request = client.post(&cfg.api_url).json(&TranslateRequest {
        text,
        source_lang: from,
        target_lang: to,
    });
    if let Some(token) = cfg.token.as_deref().filter(|t| !t.is_empty()) {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("POST {}", cfg.api_url))?;
    let status = response.status();
    let body = response.bytes().await.context("reading translation")?;
    if status != reqwest::StatusCode::OK {
        warn!(plugin = "fy", %status, "Translation refused");
        return Ok(None);
    }
    let translated = parse_response(&body);
    if translated.is_none() {
        warn!(plugin = "fy", body = %String::from_utf8_lossy(&body), "Translation returned no text");
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_code_200_with_data_counts() {
        assert_eq!(
            parse_response(br#"{"code": 200, "data": "Hello", "alternatives": []}"#).as_deref(),
            Some("Hello")
        );
        assert!(parse_response(br#"{"code": 429, "data": "Hello"}"#).is_none());
        assert!(parse_response(br#"{"code": 200, "data": "  "}"#).is_none());
        assert!(parse_response(b"<html>").is_none());
    }
}
