use pulse_models::config::SelectionConfig;
use pulse_models::report::RunResult;
use pulse_models::ticker::{Ticker, TickerProvenance};
use pulse_providers::NewsProvider;
use tracing::{info, warn};

use crate::error::PipelineError;

/// The tickers chosen for a run plus any degradation encountered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub tickers: Vec<Ticker>,
    pub warnings: Vec<String>,
}

/// Choose the run's tickers.
///
/// Order of preference: the signals of the last persisted run, then the
/// provider's trending list, then the configured seed list. The result is
/// non-empty, distinct, uppercase and at most `max_tickers` long.
pub async fn select_tickers(
    prior: Option<&RunResult>,
    news: &dyn NewsProvider,
    config: &SelectionConfig,
) -> Result<Selection, PipelineError> {
    let mut warnings = Vec::new();

    if let Some(prior) = prior {
        let tickers = collect(prior.signal_tickers(), TickerProvenance::PriorSignal, config.max_tickers);
        if !tickers.is_empty() {
            info!(count = tickers.len(), "Tickers taken from prior signals");
            return Ok(Selection { tickers, warnings });
        }
    }

    match news.discover_trending(&config.region, config.max_tickers).await {
        Ok(symbols) => {
            let tickers = collect(
                symbols.iter().map(String::as_str),
                TickerProvenance::Discovered,
                config.max_tickers,
            );
            if !tickers.is_empty() {
                info!(count = tickers.len(), region = %config.region, "Tickers discovered");
                return Ok(Selection { tickers, warnings });
            }
            warnings.push(format!("trending discovery for {} returned no symbols", config.region));
        }
        Err(e) => {
            warn!(error = %e, region = %config.region, "Trending discovery failed");
            warnings.push(format!("trending discovery failed: {e}"));
        }
    }

    let tickers = collect(
        config.seed_tickers.iter().map(String::as_str),
        TickerProvenance::Seed,
        config.max_tickers,
    );
    if tickers.is_empty() {
        let mut detail = "no prior signals, no trending symbols and no seed tickers".to_string();
        if !warnings.is_empty() {
            detail = format!("{detail} ({})", warnings.join("; "));
        }
        return Err(PipelineError::NoTickersAvailable(detail));
    }
    info!(count = tickers.len(), "Tickers taken from seed list");
    Ok(Selection { tickers, warnings })
}

fn collect<'a>(
    symbols: impl Iterator<Item = &'a str>,
    provenance: TickerProvenance,
    cap: usize,
) -> Vec<Ticker> {
    let mut tickers: Vec<Ticker> = Vec::new();
    for symbol in symbols {
        if tickers.len() >= cap {
            break;
        }
        let ticker = Ticker::new(symbol, provenance);
        if ticker.symbol.is_empty() || tickers.iter().any(|t| t.symbol == ticker.symbol) {
            continue;
        }
        tickers.push(ticker);
    }
    tickers
}
