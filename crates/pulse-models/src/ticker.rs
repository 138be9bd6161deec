use serde::{Deserialize, Serialize};

/// Where a ticker in the run's selection came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TickerProvenance {
    /// Referenced by the signals of the last persisted run.
    PriorSignal,
    /// Returned by the news provider's trending discovery endpoint.
    Discovered,
    /// Taken from the configured seed list.
    Seed,
}

/// A ticker symbol selected for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Ticker {
    pub symbol: String,
    pub provenance: TickerProvenance,
}

impl Ticker {
    /// Build a ticker, normalizing the symbol to trimmed uppercase.
    pub fn new(symbol: &str, provenance: TickerProvenance) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            provenance,
        }
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Trim and uppercase a raw symbol string.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_symbol() {
        let ticker = Ticker::new("  aapl ", TickerProvenance::Discovered);
        assert_eq!(ticker.symbol, "AAPL");
        assert_eq!(ticker.to_string(), "AAPL");
    }

    #[test]
    fn provenance_serializes_snake_case() {
        let json = serde_json::to_string(&TickerProvenance::PriorSignal).unwrap();
        assert_eq!(json, r#""prior_signal""#);
    }
}
