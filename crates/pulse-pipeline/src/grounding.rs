//! Turns the run's news and indicators into the numbered Source list and the
//! per-ticker blocks the prompt is built from.

use std::collections::HashMap;

use pulse_models::indicator::IndicatorSet;
use pulse_models::news::NewsItem;
use pulse_models::report::Source;
use pulse_models::ticker::Ticker;

use crate::indicators::any_available;

const MAX_HEADLINE_CHARS: usize = 180;

/// Grounding material for a single ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerBlock {
    pub ticker: String,
    /// Ordinals this ticker's headlines were assigned, in news order.
    pub ordinals: Vec<usize>,
    /// `[k] headline (source, date)` lines.
    pub lines: Vec<String>,
    pub indicators: IndicatorSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grounding {
    pub blocks: Vec<TickerBlock>,
    /// Contiguous ordinals 1..=N.
    pub sources: Vec<Source>,
    pub include_indicators: bool,
}

/// Number the run's citable news and build the per-ticker blocks.
///
/// Tickers are walked in selection order and news in aggregator order. A URL
/// already numbered under an earlier ticker reuses its ordinal. New URLs past
/// `max_sources` and items without a URL are left out.
pub fn assemble(
    tickers: &[Ticker],
    news: &HashMap<String, Vec<NewsItem>>,
    indicators: &HashMap<String, IndicatorSet>,
    max_sources: usize,
) -> Grounding {
    let mut sources: Vec<Source> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut blocks = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        let mut ordinals = Vec::new();
        let mut lines = Vec::new();

        for item in news.get(&ticker.symbol).into_iter().flatten() {
            let Some(url) = item.url.as_deref().filter(|_| item.is_citable()) else {
                continue;
            };
            let ordinal = match by_url.get(url) {
                Some(&existing) => existing,
                None if sources.len() < max_sources => {
                    let ordinal = sources.len() + 1;
                    by_url.insert(url.to_string(), ordinal);
                    sources.push(Source {
                        ordinal,
                        url: url.to_string(),
                        item: item.clone(),
                    });
                    ordinal
                }
                None => continue,
            };
            if ordinals.contains(&ordinal) {
                continue;
            }
            ordinals.push(ordinal);
            lines.push(citation_line(ordinal, item));
        }

        let indicators = indicators
            .get(&ticker.symbol)
            .cloned()
            .unwrap_or_else(|| IndicatorSet::unavailable(&ticker.symbol));

        blocks.push(TickerBlock {
            ticker: ticker.symbol.clone(),
            ordinals,
            lines,
            indicators,
        });
    }

    let sets: Vec<IndicatorSet> = blocks.iter().map(|b| b.indicators.clone()).collect();
    Grounding {
        include_indicators: any_available(&sets),
        blocks,
        sources,
    }
}

fn citation_line(ordinal: usize, item: &NewsItem) -> String {
    let headline = truncate_headline(&item.headline);
    match item.published_at {
        Some(at) => format!("[{ordinal}] {headline} ({}, {})", item.source, at.format("%Y-%m-%d")),
        None => format!("[{ordinal}] {headline} ({})", item.source),
    }
}

fn truncate_headline(headline: &str) -> String {
    if headline.chars().count() <= MAX_HEADLINE_CHARS {
        return headline.to_string();
    }
    let kept: String = headline.chars().take(MAX_HEADLINE_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}

impl Grounding {
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn block(&self, ticker: &str) -> Option<&TickerBlock> {
        self.blocks.iter().find(|b| b.ticker == ticker)
    }

    pub fn indicator_sets(&self) -> Vec<IndicatorSet> {
        self.blocks.iter().map(|b| b.indicators.clone()).collect()
    }

    /// Per-ticker grounding as it appears in the prompt.
    pub fn render_blocks(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&format!("### {}\n", block.ticker));
            if let Some(sector) = &block.indicators.sector {
                out.push_str(&format!("Sector: {sector}\n"));
            }
            out.push_str("News:\n");
            if block.lines.is_empty() {
                out.push_str("- none\n");
            }
            for line in &block.lines {
                out.push_str(&format!("- {line}\n"));
            }
            out.push_str(&format!("Indicators: {}\n\n", block.indicators.summary()));
        }
        out.trim_end().to_string()
    }

    /// The authoritative Sources section, numbered 1..=N.
    pub fn render_sources(&self) -> String {
        let mut out = String::from("## Sources\n");
        if self.sources.is_empty() {
            out.push_str("No sources available.\n");
        }
        for source in &self.sources {
            out.push_str(&format!(
                "{}. {} ({}): {}\n",
                source.ordinal,
                truncate_headline(&source.item.headline),
                source.item.source,
                source.url
            ));
        }
        out.trim_end().to_string()
    }

    /// Key Indicators section built from local data.
    pub fn render_key_indicators(&self) -> String {
        let mut out = String::from("## Key Indicators\n");
        for block in &self.blocks {
            let set = &block.indicators;
            let about: Vec<&str> = [set.name.as_deref(), set.sector.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            let label = if about.is_empty() {
                block.ticker.clone()
            } else {
                format!("{} ({})", block.ticker, about.join(", "))
            };
            out.push_str(&format!("- {label}: {}\n", set.summary()));
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{news_item, search_item};
    use pulse_models::ticker::TickerProvenance;
    use rust_decimal_macros::dec;

    fn tickers(symbols: &[&str]) -> Vec<Ticker> {
        symbols
            .iter()
            .map(|s| Ticker::new(s, TickerProvenance::Discovered))
            .collect()
    }

    fn news(entries: Vec<(&str, Vec<NewsItem>)>) -> HashMap<String, Vec<NewsItem>> {
        entries
            .into_iter()
            .map(|(t, items)| (t.to_string(), items))
            .collect()
    }

    #[test]
    fn ordinals_are_contiguous_and_shared_urls_reuse() {
        let news = news(vec![
            (
                "AAPL",
                vec![
                    news_item("AAPL", "Apple and Microsoft team up", "https://example.com/shared"),
                    news_item("AAPL", "Apple demand", "https://example.com/a"),
                ],
            ),
            (
                "MSFT",
                vec![
                    search_item("MSFT", "Apple and Microsoft team up", "https://example.com/shared"),
                    search_item("MSFT", "Azure", "https://example.com/m"),
                ],
            ),
        ]);
        let grounding = assemble(&tickers(&["AAPL", "MSFT"]), &news, &HashMap::new(), 20);

        let ordinals: Vec<usize> = grounding.sources.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(grounding.block("AAPL").unwrap().ordinals, vec![1, 2]);
        assert_eq!(grounding.block("MSFT").unwrap().ordinals, vec![1, 3]);

        let mut urls: Vec<&str> = grounding.sources.iter().map(|s| s.url.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), grounding.source_count());
    }

    #[test]
    fn cap_and_urlless_items_are_left_out() {
        let mut item_without_url = news_item("AAPL", "No link", "https://x");
        item_without_url.url = None;
        let news = news(vec![(
            "AAPL",
            vec![
                item_without_url,
                news_item("AAPL", "One", "https://example.com/1"),
                news_item("AAPL", "Two", "https://example.com/2"),
                news_item("AAPL", "Three", "https://example.com/3"),
            ],
        )]);
        let grounding = assemble(&tickers(&["AAPL"]), &news, &HashMap::new(), 2);

        assert_eq!(grounding.source_count(), 2);
        let block = grounding.block("AAPL").unwrap();
        assert_eq!(block.lines.len(), 2);
        assert!(block.lines.iter().all(|l| !l.contains("No link") && !l.contains("Three")));
    }

    #[test]
    fn lines_are_formatted_and_truncated() {
        let long = "x".repeat(250);
        let news = news(vec![("AAPL", vec![news_item("AAPL", &long, "https://example.com/long")])]);
        let grounding = assemble(&tickers(&["AAPL"]), &news, &HashMap::new(), 20);
        let line = &grounding.block("AAPL").unwrap().lines[0];
        assert!(line.starts_with("[1] xxx"));
        assert!(line.contains("...") && line.ends_with("(Yahoo Finance RSS, 2024-10-16)"));
        let headline_len = line.len() - "[1] ".len() - " (Yahoo Finance RSS, 2024-10-16)".len();
        assert_eq!(headline_len, 180);
    }

    #[test]
    fn indicators_flag_is_run_wide() {
        let mut aapl = IndicatorSet::unavailable("AAPL");
        aapl.price = Some(dec!(187.43));
        aapl.name = Some("Apple Inc.".to_string());
        let indicators: HashMap<String, IndicatorSet> =
            [("AAPL".to_string(), aapl)].into_iter().collect();

        let grounding = assemble(&tickers(&["AAPL", "MSFT"]), &HashMap::new(), &indicators, 20);
        assert!(grounding.include_indicators);
        let section = grounding.render_key_indicators();
        assert!(section.contains("- AAPL (Apple Inc.): price 187.43"));
        assert!(section.contains("- MSFT: not available"));

        let empty = assemble(&tickers(&["MSFT"]), &HashMap::new(), &HashMap::new(), 20);
        assert!(!empty.include_indicators);
    }

    #[test]
    fn sector_is_carried_into_blocks_and_indicators() {
        let mut aapl = IndicatorSet::unavailable("AAPL");
        aapl.price = Some(dec!(187.43));
        aapl.name = Some("Apple Inc.".to_string());
        aapl.sector = Some("Technology".to_string());
        let mut xom = IndicatorSet::unavailable("XOM");
        xom.sector = Some("Energy".to_string());
        let indicators: HashMap<String, IndicatorSet> =
            [("AAPL".to_string(), aapl), ("XOM".to_string(), xom)].into_iter().collect();

        let grounding = assemble(&tickers(&["AAPL", "XOM"]), &HashMap::new(), &indicators, 20);
        let blocks = grounding.render_blocks();
        assert!(blocks.contains("### AAPL\nSector: Technology\nNews:"));
        assert!(blocks.contains("### XOM\nSector: Energy\nNews:"));

        let section = grounding.render_key_indicators();
        assert!(section.contains("- AAPL (Apple Inc., Technology): price 187.43"));
        assert!(section.contains("- XOM (Energy): not available"));
    }

    #[test]
    fn sources_render_every_ordinal() {
        let news = news(vec![(
            "AAPL",
            vec![
                news_item("AAPL", "One", "https://example.com/1"),
                news_item("AAPL", "Two", "https://example.com/2"),
            ],
        )]);
        let grounding = assemble(&tickers(&["AAPL"]), &news, &HashMap::new(), 20);
        let rendered = grounding.render_sources();
        assert!(rendered.starts_with("## Sources\n"));
        assert!(rendered.contains("1. One (Yahoo Finance RSS): https://example.com/1"));
        assert!(rendered.contains("2. Two (Yahoo Finance RSS): https://example.com/2"));
    }
}
