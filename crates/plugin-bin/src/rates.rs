//! Exchange-rate lines appended to a lookup. Every failure is silent.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub to_usd: Option<f64>,
    pub to_cny: Option<f64>,
    pub usd_to_cny: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

async fn latest(client: &reqwest::Client, base_url: &str, code: &str) -> Option<HashMap<String, f64>> {
    let url = format!("{}/v4/latest/{code}", base_url.trim_end_matches('/'));
    let response = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            debug!(url = %url, status = %resp.status(), "Exchange rate lookup refused");
            return None;
        }
        Err(err) => {
            debug!(url = %url, error = %err, "Exchange rate lookup failed");
            return None;
        }
    };
    response.json::<LatestRates>().await.ok().map(|r| r.rates)
}

fn positive(rate: Option<&f64>) -> Option<f64> {
    rate.copied().filter(|r| *r > 0.0)
}

pub async fn fetch(client: &reqwest::Client, base_url: &str, code: &str) -> Rates {
    let mut rates = Rates::default();
    if let Some(table) = latest(client, base_url, code).await {
        rates.to_usd = positive(table.get("USD"));
        rates.to_cny = positive(table.get("CNY"));
    }
    if let Some(table) = latest(client, base_url, "USD").await {
        rates.usd_to_cny = positive(table.get("CNY"));
    }
    rates
}

#[must_use]
pub fn lines(code: &str, rates: &Rates) -> Vec<String> {
    [
        rates.to_usd.map(|r| format!("**1 {code} = {r:.2} USD**")),
        rates.to_cny.map(|r| format!("**1 {code} = {r:.2} CNY**")),
        rates.usd_to_cny.map(|r| format!("**1 USD = {r:.2} CNY**")),
    ]
    .into_iter()
    .flatten()
    .collect()
}
