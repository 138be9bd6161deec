use serde::{Deserialize, Serialize};

/// Top-level configuration for Pulse. Every section and field has a default,
/// so a partial (or empty) TOML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PulseConfig {
    pub store: StoreConfig,
    pub selection: SelectionConfig,
    pub news: NewsConfig,
    pub quotes: QuotesConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub progress: ProgressConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite file holding the last result, raw output and credential.
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/pulse.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Upper bound on the number of tickers in a run.
    pub max_tickers: usize,
    /// Region passed to trending-ticker discovery.
    pub region: String,
    /// Last-resort tickers when neither prior signals nor discovery yield any.
    pub seed_tickers: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_tickers: 6,
            region: "US".to_string(),
            seed_tickers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewsConfig {
    /// RSS headline feed. `{ticker}` is substituted.
    pub feed_url: String,
    /// Keyword search endpoint.
    pub search_url: String,
    /// Trending tickers endpoint. `{region}` is substituted.
    pub trending_url: String,
    /// Results requested from the search channel per ticker.
    pub search_count: usize,
    /// Cap applied per ticker after merging and deduplicating both channels.
    pub max_items_per_ticker: usize,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://feeds.finance.yahoo.com/rss/2.0/headline?s={ticker}&region=US&lang=en-US"
                .to_string(),
            search_url: "https://query1.finance.yahoo.com/v1/finance/search".to_string(),
            trending_url: "https://query1.finance.yahoo.com/v1/finance/trending/{region}".to_string(),
            search_count: 5,
            max_items_per_ticker: 5,
            timeout_seconds: 10,
            user_agent: "Pulse/0.1 (+https://example.com)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotesConfig {
    /// Quote endpoint. The symbol is passed as the `symbols` query parameter.
    pub quote_url: String,
    pub timeout_seconds: u64,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            quote_url: "https://query1.finance.yahoo.com/v7/finance/quote".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
    /// Total attempts for the completion call, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on each further retry.
    pub initial_backoff_ms: u64,
    /// Environment variable consulted when no credential is stored.
    pub credential_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_seconds: 60,
            max_attempts: 3,
            initial_backoff_ms: 500,
            credential_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent per-ticker fetches for each of news and quotes.
    pub fetch_concurrency: usize,
    /// Run-wide cap on the numbered Source list.
    pub max_sources: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 4,
            max_sources: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long a finished run's event log stays available for catch-up.
    pub grace_seconds: u64,
    /// Live channel buffer per run. Slow subscribers are caught up from the log.
    pub channel_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            grace_seconds: 120,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_pulse_config() {
        let config = PulseConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PulseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: PulseConfig = toml::from_str("").unwrap();
        assert_eq!(config, PulseConfig::default());
        assert_eq!(config.selection.max_tickers, 6);
        assert!(config.selection.seed_tickers.is_empty());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[store]
sqlite_path = "/tmp/pulse_test.db"

[selection]
max_tickers = 3
seed_tickers = ["AAPL", "MSFT"]

[model]
model = "gpt-4o"
max_attempts = 5

[progress]
grace_seconds = 30
"#;

        let config: PulseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.sqlite_path, "/tmp/pulse_test.db");
        assert_eq!(config.selection.max_tickers, 3);
        assert_eq!(config.selection.region, "US");
        assert_eq!(config.selection.seed_tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.max_attempts, 5);
        assert_eq!(config.model.initial_backoff_ms, 500);
        assert_eq!(config.progress.grace_seconds, 30);
        assert_eq!(config.pipeline.max_sources, 20);
    }
}
