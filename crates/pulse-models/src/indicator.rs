use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Named quote metrics tracked per ticker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Price,
    PreviousClose,
    ChangePct,
    MarketCap,
    PeRatio,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Price,
        Metric::PreviousClose,
        Metric::ChangePct,
        Metric::MarketCap,
        Metric::PeRatio,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Price => "price",
            Metric::PreviousClose => "previous close",
            Metric::ChangePct => "change",
            Metric::MarketCap => "market cap",
            Metric::PeRatio => "P/E",
        }
    }

    /// Render a value for prompts and reports.
    pub fn format(&self, value: Decimal) -> String {
        let two_dp = |v: Decimal| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        match self {
            Metric::ChangePct => {
                let v = two_dp(value);
                if v.is_sign_positive() && !v.is_zero() {
                    format!("+{v}%")
                } else {
                    format!("{v}%")
                }
            }
            Metric::MarketCap => format_market_cap(value),
            Metric::Price | Metric::PreviousClose | Metric::PeRatio => two_dp(value).to_string(),
        }
    }
}

fn format_market_cap(value: Decimal) -> String {
    let scales = [
        (Decimal::from(1_000_000_000_000u64), "T"),
        (Decimal::from(1_000_000_000u64), "B"),
        (Decimal::from(1_000_000u64), "M"),
    ];
    for (scale, suffix) in scales {
        if value.abs() >= scale {
            let scaled = (value / scale)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .normalize();
            return format!("{scaled}{suffix}");
        }
    }
    value.round_dp(0).to_string()
}

/// Quote metrics for one ticker. Any metric may be absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndicatorSet {
    pub ticker: String,
    /// Company display name reported by the quote provider.
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    pub price: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub change_pct: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
}

impl IndicatorSet {
    /// An all-absent set, used when the provider failed for a ticker.
    pub fn unavailable(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }

    pub fn get(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::Price => self.price,
            Metric::PreviousClose => self.previous_close,
            Metric::ChangePct => self.change_pct,
            Metric::MarketCap => self.market_cap,
            Metric::PeRatio => self.pe_ratio,
        }
    }

    /// True when at least one metric is present. Name and sector do not count.
    pub fn is_available(&self) -> bool {
        Metric::ALL.iter().any(|m| self.get(*m).is_some())
    }

    /// Present metrics in display order.
    pub fn present(&self) -> Vec<(Metric, Decimal)> {
        Metric::ALL
            .iter()
            .filter_map(|m| self.get(*m).map(|v| (*m, v)))
            .collect()
    }

    /// One-line summary, e.g. `price 189.84, change +1.25%`, or "not available".
    pub fn summary(&self) -> String {
        let present = self.present();
        if present.is_empty() {
            return "not available".to_string();
        }
        present
            .iter()
            .map(|(m, v)| format!("{} {}", m.label(), m.format(*v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unavailable_set_has_no_metrics() {
        let set = IndicatorSet::unavailable("MSFT");
        assert!(!set.is_available());
        assert_eq!(set.summary(), "not available");
    }

    #[test]
    fn name_alone_does_not_make_set_available() {
        let set = IndicatorSet {
            ticker: "MSFT".to_string(),
            name: Some("Microsoft".to_string()),
            ..Default::default()
        };
        assert!(!set.is_available());
    }

    #[test]
    fn summary_lists_present_metrics_in_order() {
        let set = IndicatorSet {
            ticker: "AAPL".to_string(),
            name: None,
            sector: None,
            price: Some(dec!(189.844)),
            previous_close: None,
            change_pct: Some(dec!(1.254)),
            market_cap: Some(dec!(2950000000000)),
            pe_ratio: None,
        };
        assert_eq!(
            set.summary(),
            "price 189.84, change +1.25%, market cap 2.95T"
        );
    }

    #[test]
    fn negative_change_has_no_plus_sign() {
        assert_eq!(Metric::ChangePct.format(dec!(-0.5)), "-0.5%");
        assert_eq!(Metric::ChangePct.format(dec!(0)), "0%");
    }

    #[test]
    fn small_market_cap_is_not_scaled() {
        assert_eq!(Metric::MarketCap.format(dec!(950000.4)), "950000");
        assert_eq!(Metric::MarketCap.format(dec!(12500000)), "12.5M");
    }
}
