pub mod config;
pub mod lookup;
pub mod rates;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use plugin_core::{
    OutgoingText, Plugin, PluginContext, PluginSpec, edit_text, factory::PluginFactory,
};
use tracing::{debug, info};

use crate::{
    config::{BinConfig, Provider},
    lookup::{BinInfo, valid_bin},
    rates::Rates,
};

const INVALID_ARG: &str = "Oops ~ invalid argument. Please give a 4 to 8 digit number.";

#[derive(Debug)]
pub struct BinPlugin;

impl PluginFactory for BinPlugin {
    fn id(&self) -> &'static str {
        "bin"
    }

    fn build(&self, spec: &PluginSpec) -> Result<Arc<dyn Plugin>> {
        let config: BinConfig = spec.typed_config();
        let client = reqwest::Client::builder()
            .user_agent(concat!("chat-plugins/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Arc::new(Bin { config, client }))
    }
}

#[derive(Debug)]
pub struct Bin {
    config: BinConfig,
    client: reqwest::Client,
}

#[async_trait]
impl Plugin for Bin {
    fn id(&self) -> &'static str {
        "bin"
    }

    fn help(&self) -> &'static str {
        "Look up a card BIN: `!bin <4-8 digits>`"
    }

    async fn run(&self, ctx: &PluginContext, args: &str, _spec: &PluginSpec) -> Result<()> {
        edit_text(ctx, "Looking up…").await?;

        let bin = args.trim();
        if !valid_bin(bin) {
            return edit_text(ctx, INVALID_ARG).await;
        }

        let result = match self.config.provider {
            Provider::Binlist => lookup::binlist(&self.client, &self.config, bin).await,
            Provider::Rapidapi => lookup::rapidapi(&self.client, &self.config, bin).await,
        };
        let info = match result {
            Ok(info) => info,
            Err(err) => {
                debug!(plugin = "bin", bin, error = %err, "Lookup failed");
                return edit_text(ctx, format!("Oops ~ {err}")).await;
            }
        };

        let rates = match info.currency.as_deref() {
            Some(code) => rates::fetch(&self.client, &self.config.rates_url, code).await,
            None => Rates::default(),
        };

        info!(plugin = "bin", provider = ?self.config.provider, "BIN lookup answered");
        let text = blockquote(&describe(bin, &info, &rates));
        edit_text(ctx, OutgoingText::Markdown(text)).await
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Reply lines in display order; missing fields are skipped.
#[must_use]
pub fn describe(bin: &str, info: &BinInfo, rates: &Rates) -> Vec<String> {
    let field = |label: &str, value: Option<&String>| value.map(|v| format!("**{label}:** `{v}`"));
    let mut out = vec![format!("**BIN:** `{bin}`")];
    out.extend(
        [
            field("Scheme", info.scheme.as_ref()),
            field("Type", info.kind.as_ref()),
            field("Brand", info.brand.as_ref()),
            field("Level", info.level.as_ref()),
            info.commercial
                .map(|c| format!("**Commercial:** `{}`", yes_no(c))),
            info.prepaid.map(|p| format!("**Prepaid:** `{}`", yes_no(p))),
            field("Bank", info.bank_name.as_ref()),
            field("Website", info.bank_url.as_ref()),
            field("Phone", info.bank_phone.as_ref()),
            field("City", info.bank_city.as_ref()),
            info.country_name.as_ref().map(|name| {
                let flag = info.country_flag.as_deref().unwrap_or_default();
                format!("**Country:** `{}`", format!("{name} {flag}").trim_end())
            }),
            field("Code", info.country_alpha2.as_ref()),
            info.currency.as_ref().map(|code| match &info.currency_name {
                Some(name) => format!("**Currency:** `{code} ({name})`"),
                None => format!("**Currency:** `{code}`"),
            }),
        ]
        .into_iter()
        .flatten(),
    );
    if let Some(code) = &info.currency {
        out.extend(rates::lines(code, rates));
    }
    out
}

#[must_use]
pub fn blockquote(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("> {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
