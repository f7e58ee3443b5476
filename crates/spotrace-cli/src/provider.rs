//! Provider selection from the `[provider]` section.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;

use spotrace_core::config::duration_field;
use spotrace_core::{MockSection, ProviderKind, ProviderSection};
use spotrace_provider::{
    ForcedWinner, HttpProvider, HttpProviderConfig, MockConfig, MockProvider, ProvisioningApi,
};

pub fn build(
    section: Option<&ProviderSection>,
    dry_run: bool,
) -> anyhow::Result<Arc<dyn ProvisioningApi>> {
    let kind = section.map(|s| s.kind).unwrap_or_default();

    if dry_run || kind == ProviderKind::Mock {
        let config = mock_config(section.and_then(|s| s.mock.as_ref()))?;
        info!(
            failure_rate = config.failure_rate,
            seed = config.seed,
            winner = ?config.winner,
            "using mock provider"
        );
        return Ok(Arc::new(MockProvider::new(config)));
    }

    let Some(section) = section else {
        bail!("no [provider] section; add one or pass --dry-run");
    };
    Ok(Arc::new(http_provider(section)?))
}

fn http_provider(section: &ProviderSection) -> anyhow::Result<HttpProvider> {
    let base_url = section
        .base_url
        .as_deref()
        .context("[provider].base_url is required for kind = \"http\"")?;

    let mut config = HttpProviderConfig::new(base_url);
    if let Some(var) = &section.api_key_env {
        let key = std::env::var(var)
            .with_context(|| format!("api key variable {var} is not set"))?;
        config.api_key = Some(key);
    }
    if let Some(timeout) = duration_field("request_timeout", section.request_timeout.as_deref())? {
        config.request_timeout = timeout;
    }

    info!(%base_url, timeout = ?config.request_timeout, "using http provider");
    Ok(HttpProvider::new(config)?)
}

/// Map `[provider.mock]` onto a `MockConfig`; missing keys keep the defaults.
pub fn mock_config(section: Option<&MockSection>) -> anyhow::Result<MockConfig> {
    let mut config = MockConfig::default();
    let Some(section) = section else {
        return Ok(config);
    };

    if let Some(latency) = duration_field("latency", section.latency.as_deref())? {
        config.latency = latency;
    }
    if let Some(ready_after) = duration_field("ready_after", section.ready_after.as_deref())? {
        config.ready_after = ready_after;
    }
    if let Some(rate) = section.failure_rate {
        if !(0.0..=1.0).contains(&rate) {
            bail!("[provider.mock].failure_rate must be within 0..=1, got {rate}");
        }
        config.failure_rate = rate;
    }
    if let Some(seed) = section.seed {
        config.seed = seed;
    }

    config.winner = match (section.winner_index, &section.winner_offer) {
        (Some(_), Some(_)) => bail!("set only one of winner_index and winner_offer"),
        (Some(index), None) => Some(ForcedWinner::CallIndex(index)),
        (None, Some(offer)) => Some(ForcedWinner::Offer(offer.clone())),
        (None, None) => None,
    };
    Ok(config)
}
