use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indicator::IndicatorSet;
use crate::news::NewsItem;
use crate::ticker::Ticker;

/// A numbered, citable source. `ordinal` is 1-based and is the number used in `[k]` citations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub ordinal: usize,
    pub url: String,
    /// The first news item that introduced this URL into the run.
    pub item: NewsItem,
}

/// Recommended action for a ticker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    /// Parse a model-supplied action, case-insensitively. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(SignalAction::Buy),
            "sell" => Some(SignalAction::Sell),
            "hold" => Some(SignalAction::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "buy"),
            SignalAction::Sell => write!(f, "sell"),
            SignalAction::Hold => write!(f, "hold"),
        }
    }
}

/// A validated trading signal tied to the run's citations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub ticker: String,
    pub name: String,
    pub action: SignalAction,
    pub reason: String,
}

/// The output of one successful run. Only the most recent one is retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    pub markdown: String,
    pub tickers: Vec<Ticker>,
    pub sources: Vec<Source>,
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub indicators: Vec<IndicatorSet>,
    pub generated_at: DateTime<Utc>,
}

impl RunResult {
    /// Tickers referenced by this result's signals, in signal order.
    pub fn signal_tickers(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.ticker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::NewsChannel;
    use crate::ticker::TickerProvenance;

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!(SignalAction::parse("Buy"), Some(SignalAction::Buy));
        assert_eq!(SignalAction::parse(" SELL "), Some(SignalAction::Sell));
        assert_eq!(SignalAction::parse("hold"), Some(SignalAction::Hold));
        assert_eq!(SignalAction::parse("accumulate"), None);
    }

    #[test]
    fn run_result_roundtrip() {
        let result = RunResult {
            run_id: Uuid::new_v4(),
            markdown: "## Daily Brief\nApple rallied [1].".to_string(),
            tickers: vec![Ticker::new("AAPL", TickerProvenance::Discovered)],
            sources: vec![Source {
                ordinal: 1,
                url: "https://example.com/a".to_string(),
                item: NewsItem {
                    ticker: "AAPL".to_string(),
                    headline: "Apple rallies".to_string(),
                    url: Some("https://example.com/a".to_string()),
                    published_at: None,
                    source: "Reuters".to_string(),
                    channel: NewsChannel::Search,
                },
            }],
            signals: vec![Signal {
                ticker: "AAPL".to_string(),
                name: "Apple Inc.".to_string(),
                action: SignalAction::Buy,
                reason: "Strong demand [1].".to_string(),
            }],
            indicators: vec![],
            generated_at: Utc::now(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
        assert_eq!(parsed.signal_tickers().collect::<Vec<_>>(), vec!["AAPL"]);
    }
}
