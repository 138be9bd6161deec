//! Pulse - grounded daily market briefs
//!
//! Selects a handful of tickers, gathers their headlines and quote data,
//! numbers every source, and asks a language model for a Markdown brief whose
//! citations and trade signals are validated against those sources.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use pulse::models::config::PulseConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let service = pulse::build_service(&PulseConfig::default())?;
//! let result = service.run_once().await?;
//! println!("{}", result.markdown);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod server;

pub use pulse_models as models;
pub use pulse_pipeline as pipeline;
pub use pulse_providers as providers;
pub use pulse_store as store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use pulse_models::config::PulseConfig;
use pulse_pipeline::BriefService;
use pulse_providers::{OpenAiClient, YahooNews, YahooQuotes};
use pulse_store::Persistence;

/// Load configuration from a TOML file. A missing file yields the defaults.
pub fn load_config(path: &str) -> Result<PulseConfig, anyhow::Error> {
    if !Path::new(path).exists() {
        tracing::warn!(path, "Config file not found, using defaults");
        return Ok(PulseConfig::default());
    }
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config: {path}"))
}

/// Build the brief service with the HTTP providers and the SQLite store.
pub fn build_service(config: &PulseConfig) -> Result<BriefService, anyhow::Error> {
    let store = Persistence::open(&config.store.sqlite_path)
        .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?;
    let news = YahooNews::new(&config.news).context("Failed to build news provider")?;
    let quotes = YahooQuotes::new(&config.quotes, &config.news.user_agent)
        .context("Failed to build quote provider")?;
    let model = OpenAiClient::new(&config.model).context("Failed to build model client")?;

    Ok(BriefService::new(
        config.clone(),
        Arc::new(store),
        Arc::new(news),
        Arc::new(quotes),
        Arc::new(model),
    ))
}
