//! BIN providers and the normalized record they produce.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::BinConfig;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("could not reach the API: {0}")]
    Unreachable(String),
    #[error("no information for this BIN, please check it")]
    NotFound,
    #[error("API returned status {0}")]
    Status(u16),
    #[error("could not parse the API response")]
    Parse,
    #[error("lookup failed, please check the BIN")]
    Failed,
    #[error("RapidAPI key is not configured")]
    MissingKey,
}

/// Card details common to both providers. Absent fields are omitted from
/// the reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinInfo {
    pub scheme: Option<String>,
    pub kind: Option<String>,
    pub brand: Option<String>,
    pub level: Option<String>,
    pub commercial: Option<bool>,
    pub prepaid: Option<bool>,
    pub bank_name: Option<String>,
    pub bank_url: Option<String>,
    pub bank_phone: Option<String>,
    pub bank_city: Option<String>,
    pub country_name: Option<String>,
    pub country_flag: Option<String>,
    pub country_alpha2: Option<String>,
    pub currency: Option<String>,
    pub currency_name: Option<String>,
}

#[must_use]
pub fn valid_bin(arg: &str) -> bool {
    (4..=8).contains(&arg.len()) && arg.bytes().all(|b| b.is_ascii_digit())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Accept `true`, `"true"` and friends.
fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s.eq_ignore_ascii_case("true")),
        Value::Null | Value::Number(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BinlistResponse {
    scheme: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    brand: Option<String>,
    prepaid: Value,
    bank: BinlistBank,
    country: BinlistCountry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BinlistBank {
    name: Option<String>,
    url: Option<String>,
    phone: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BinlistCountry {
    name: Option<String>,
    emoji: Option<String>,
    alpha2: Option<String>,
    currency: Option<String>,
}

/// Parse a binlist.net body.
///
/// # Errors
///
/// [`LookupError::Parse`] on invalid JSON, [`LookupError::Failed`] on an
/// empty document.
pub fn parse_binlist(body: &[u8]) -> Result<BinInfo, LookupError> {
    let raw: Value = serde_json::from_slice(body).map_err(|_| LookupError::Parse)?;
    if raw.as_object().is_none_or(serde_json::Map::is_empty) {
        return Err(LookupError::Failed);
    }
    let parsed: BinlistResponse = serde_json::from_value(raw).map_err(|_| LookupError::Parse)?;
    Ok(BinInfo {
        scheme: non_empty(parsed.scheme),
        kind: non_empty(parsed.kind),
        brand: non_empty(parsed.brand),
        level: None,
        commercial: None,
        prepaid: flag(&parsed.prepaid),
        bank_name: non_empty(parsed.bank.name),
        bank_url: non_empty(parsed.bank.url),
        bank_phone: non_empty(parsed.bank.phone),
        bank_city: non_empty(parsed.bank.city),
        country_name: non_empty(parsed.country.name),
        country_flag: non_empty(parsed.country.emoji),
        country_alpha2: non_empty(parsed.country.alpha2),
        currency: non_empty(parsed.country.currency),
        currency_name: None,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RapidResponse {
    success: Value,
    #[serde(rename = "BIN")]
    bin: RapidBin,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RapidBin {
    scheme: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    brand: Option<String>,
    level: Option<String>,
    is_commercial: Value,
    is_prepaid: Value,
    issuer: RapidIssuer,
    country: RapidCountry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RapidIssuer {
    name: Option<String>,
    website: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RapidCountry {
    name: Option<String>,
    flag: Option<String>,
    alpha2: Option<String>,
    currency: Option<String>,
    currency_name: Option<String>,
}

/// Parse a bin-ip-checker body.
///
/// # Errors
///
/// [`LookupError::Parse`] on invalid JSON, [`LookupError::Failed`] unless
/// `success` is true.
pub fn parse_rapidapi(body: &[u8]) -> Result<BinInfo, LookupError> {
    let parsed: RapidResponse = serde_json::from_slice(body).map_err(|_| LookupError::Parse)?;
    if flag(&parsed.success) != Some(true) {
        return Err(LookupError::Failed);
    }
    let bin = parsed.bin;
    Ok(BinInfo {
        scheme: non_empty(bin.scheme),
        kind: non_empty(bin.kind),
        brand: non_empty(bin.brand),
        level: non_empty(bin.level),
        commercial: flag(&bin.is_commercial),
        prepaid: flag(&bin.is_prepaid),
        bank_name: non_empty(bin.issuer.name),
        bank_url: non_empty(bin.issuer.website),
        bank_phone: non_empty(bin.issuer.phone),
        bank_city: None,
        country_name: non_empty(bin.country.name),
        country_flag: non_empty(bin.country.flag),
        country_alpha2: non_empty(bin.country.alpha2),
        currency: non_empty(bin.country.currency),
        currency_name: non_empty(bin.country.currency_name),
    })
}

/// Query binlist.net.
///
/// # Errors
///
/// See [`LookupError`].
pub async fn binlist(
    client: &reqwest::Client,
    cfg: &BinConfig,
    bin: &str,
) -> Result<BinInfo, LookupError> {
    let url = format!("{}/{bin}", cfg.binlist_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .header("Accept-Version", "3")
        .send()
        .await
        .map_err(|e| LookupError::Unreachable(e.to_string()))?;
    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return Err(LookupError::NotFound),
        other => return Err(LookupError::Status(other.as_u16())),
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| LookupError::Unreachable(e.to_string()))?;
    parse_binlist(&body)
}

/// Query the RapidAPI bin-ip-checker.
///
/// # Errors
///
/// See [`LookupError`].
pub async fn rapidapi(
    client: &reqwest::Client,
    cfg: &BinConfig,
    bin: &str,
) -> Result<BinInfo, LookupError> {
    let key = cfg.rapidapi_key().ok_or(LookupError::MissingKey)?;
    let response = client
        .post(&cfg.rapidapi_url)
        .query(&[("bin", bin)])
        .header("x-rapidapi-key", key)
        .header("x-rapidapi-host", &cfg.rapidapi_host)
        .json(&serde_json::json!({ "bin": bin }))
        .send()
        .await
        .map_err(|e| LookupError::Unreachable(e.to_string()))?;
    if response.status() != StatusCode::OK {
        return Err(LookupError::Status(response.status().as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| LookupError::Unreachable(e.to_string()))?;
    parse_rapidapi(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_must_be_four_to_eight_digits() {
        assert!(valid_bin("4242"));
        assert!(valid_bin("45717360"));
        assert!(!valid_bin("424"));
        assert!(!valid_bin("457173601"));
        assert!(!valid_bin("42a42"));
        assert!(!valid_bin(""));
    }

    #[test]
    fn binlist_document_maps_to_info() {
        let body = r#"{
            "number": {}, "scheme": "visa", "type": "debit", "brand": "Visa Classic",
            "prepaid": false,
            "country": {"numeric": "208", "alpha2": "DK", "name": "Denmark", "emoji": "🇩🇰", "currency": "DKK"},
            "bank": {"name": "Jyske Bank A/S", "url": "www.jyskebank.dk", "phone": "", "city": null}
        }"#;
        let info = parse_binlist(body.as_bytes()).unwrap();
        assert_eq!(info.scheme.as_deref(), Some("visa"));
        assert_eq!(info.prepaid, Some(false));
        assert_eq!(info.bank_phone, None);
        assert_eq!(info.bank_city, None);
        assert_eq!(info.country_flag.as_deref(), Some("🇩🇰"));
        assert_eq!(info.currency.as_deref(), Some("DKK"));
    }

    #[test]
    fn binlist_empty_and_garbage_bodies() {
        assert!(matches!(parse_binlist(b"{}"), Err(LookupError::Failed)));
        assert!(matches!(parse_binlist(b"not json"), Err(LookupError::Parse)));
    }

    #[test]
    fn rapidapi_string_flags_are_understood() {
        let body = r#"{
            "success": true, "code": 200,
            "BIN": {
                "valid": true, "number": 457173, "scheme": "VISA", "type": "DEBIT",
                "level": "CLASSIC", "is_commercial": "false", "is_prepaid": "true",
                "issuer": {"name": "JYSKE BANK", "website": "http://www.jyskebank.dk", "phone": "+4589893300"},
                "country": {"name": "DENMARK", "alpha2": "DK", "flag": "🇩🇰", "currency": "DKK", "currency_name": "Danish Krone"}
            }
        }"#;
        let info = parse_rapidapi(body.as_bytes()).unwrap();
        assert_eq!(info.commercial, Some(false));
        assert_eq!(info.prepaid, Some(true));
        assert_eq!(info.level.as_deref(), Some("CLASSIC"));
        assert_eq!(info.currency_name.as_deref(), Some("Danish Krone"));
        assert_eq!(info.bank_url.as_deref(), Some("http://www.jyskebank.dk"));
    }

    #[test]
    fn rapidapi_requires_success() {
        assert!(matches!(
            parse_rapidapi(br#"{"success": false}"#),
            Err(LookupError::Failed)
        ));
        assert!(matches!(parse_rapidapi(b"{}"), Err(LookupError::Failed)));
    }
}
