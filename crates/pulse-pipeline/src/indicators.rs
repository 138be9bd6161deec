use pulse_models::indicator::IndicatorSet;
use pulse_providers::{QuoteProvider, QuoteSnapshot};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Fetch the quote metrics for one ticker.
///
/// Never fails: a provider error yields an all-absent set and a warning.
pub async fn fetch_indicators(
    provider: &dyn QuoteProvider,
    ticker: &str,
) -> (IndicatorSet, Option<String>) {
    match provider.quote(ticker).await {
        Ok(snapshot) => {
            let set = indicator_set(ticker, snapshot);
            debug!(ticker, metrics = set.present().len(), "Quote fetched");
            if set.is_available() {
                (set, None)
            } else {
                (set, Some(format!("{ticker}: quote returned no metrics")))
            }
        }
        Err(e) => {
            warn!(ticker, error = %e, "Quote fetch failed");
            (
                IndicatorSet::unavailable(ticker),
                Some(format!("{ticker}: indicators unavailable ({e})")),
            )
        }
    }
}

/// Map a provider snapshot, deriving the change percentage from price and
/// previous close when the provider omits it.
pub fn indicator_set(ticker: &str, snapshot: QuoteSnapshot) -> IndicatorSet {
    let change_pct = snapshot
        .change_pct
        .or_else(|| derive_change_pct(snapshot.price?, snapshot.previous_close?));
    IndicatorSet {
        ticker: ticker.to_string(),
        name: snapshot.name,
        sector: snapshot.sector,
        price: snapshot.price,
        previous_close: snapshot.previous_close,
        change_pct,
        market_cap: snapshot.market_cap,
        pe_ratio: snapshot.pe_ratio,
    }
}

fn derive_change_pct(price: Decimal, previous_close: Decimal) -> Option<Decimal> {
    if previous_close.is_zero() {
        return None;
    }
    let pct = (price - previous_close) / previous_close * Decimal::ONE_HUNDRED;
    Some(pct.round_dp(4))
}

/// The Key Indicators section is rendered iff any ticker has any metric.
pub fn any_available(sets: &[IndicatorSet]) -> bool {
    sets.iter().any(IndicatorSet::is_available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedQuotes;
    use rust_decimal_macros::dec;

    #[test]
    fn change_pct_derived_when_missing() {
        let set = indicator_set(
            "AAPL",
            QuoteSnapshot {
                price: Some(dec!(110)),
                previous_close: Some(dec!(100)),
                ..QuoteSnapshot::default()
            },
        );
        assert_eq!(set.change_pct, Some(dec!(10)));
    }

    #[test]
    fn name_and_sector_are_copied() {
        let set = indicator_set(
            "AAPL",
            QuoteSnapshot {
                name: Some("Apple Inc.".to_string()),
                sector: Some("Technology".to_string()),
                ..QuoteSnapshot::default()
            },
        );
        assert_eq!(set.name.as_deref(), Some("Apple Inc."));
        assert_eq!(set.sector.as_deref(), Some("Technology"));
        assert!(!set.is_available());
    }

    #[test]
    fn provider_change_pct_is_kept() {
        let set = indicator_set(
            "AAPL",
            QuoteSnapshot {
                price: Some(dec!(110)),
                previous_close: Some(dec!(100)),
                change_pct: Some(dec!(9.99)),
                ..QuoteSnapshot::default()
            },
        );
        assert_eq!(set.change_pct, Some(dec!(9.99)));
    }

    #[test]
    fn zero_previous_close_gives_no_change() {
        let set = indicator_set(
            "XYZ",
            QuoteSnapshot {
                price: Some(dec!(1)),
                previous_close: Some(Decimal::ZERO),
                ..QuoteSnapshot::default()
            },
        );
        assert!(set.change_pct.is_none());
    }

    #[tokio::test]
    async fn failure_yields_absent_set_and_warning() {
        let quotes = ScriptedQuotes::new();
        let (set, warning) = fetch_indicators(&quotes, "MSFT").await;
        assert_eq!(set, IndicatorSet::unavailable("MSFT"));
        assert!(warning.unwrap().contains("MSFT"));
    }

    #[test]
    fn any_available_is_run_wide() {
        let mut full = IndicatorSet::unavailable("AAPL");
        full.price = Some(dec!(187.43));
        assert!(any_available(&[full, IndicatorSet::unavailable("MSFT")]));
        assert!(!any_available(&[
            IndicatorSet::unavailable("AAPL"),
            IndicatorSet::unavailable("MSFT")
        ]));
    }
}
