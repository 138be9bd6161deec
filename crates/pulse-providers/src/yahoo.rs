//! Yahoo Finance news (RSS feed, keyword search, trending symbols) and quotes.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_models::config::{NewsConfig, QuotesConfig};
use pulse_models::news::{NewsChannel, NewsItem};
use pulse_models::ticker::normalize_symbol;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{build_client, check_status};
use crate::traits::{NewsProvider, QuoteProvider, QuoteSnapshot};

const FEED_SOURCE: &str = "Yahoo Finance RSS";
const SEARCH_SOURCE: &str = "Yahoo Finance";

/// News and trending-symbol client backed by Yahoo Finance.
pub struct YahooNews {
    client: Client,
    config: NewsConfig,
}

impl YahooNews {
    pub fn new(config: &NewsConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config.timeout_seconds, &config.user_agent)?,
            config: config.clone(),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ProviderError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_seconds))?;
        check_status(resp)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_seconds))
    }
}

#[async_trait]
impl NewsProvider for YahooNews {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn feed(&self, ticker: &str) -> Result<Vec<NewsItem>, ProviderError> {
        let url = self.config.feed_url.replace("{ticker}", ticker);
        let body = self.get_text(&url, &[]).await?;
        let items = parse_rss(ticker, &body)?;
        debug!(ticker, count = items.len(), "Feed items parsed");
        Ok(items)
    }

    async fn search(
        &self,
        ticker: &str,
        query: &str,
        count: usize,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        let params = [
            ("q", query.to_string()),
            ("newsCount", count.to_string()),
            ("quotesCount", "0".to_string()),
        ];
        let body = self.get_text(&self.config.search_url, &params).await?;
        let mut items = parse_search(ticker, &body)?;
        items.truncate(count);
        debug!(ticker, count = items.len(), "Search items parsed");
        Ok(items)
    }

    async fn discover_trending(
        &self,
        region: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let url = self.config.trending_url.replace("{region}", region);
        let body = self.get_text(&url, &[]).await?;
        parse_trending(&body, limit)
    }
}

/// Quote client backed by the Yahoo Finance v7 quote endpoint.
pub struct YahooQuotes {
    client: Client,
    config: QuotesConfig,
}

impl YahooQuotes {
    pub fn new(config: &QuotesConfig, user_agent: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config.timeout_seconds, user_agent)?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooQuotes {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn quote(&self, ticker: &str) -> Result<QuoteSnapshot, ProviderError> {
        let resp = self
            .client
            .get(&self.config.quote_url)
            .query(&[("symbols", ticker)])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_seconds))?;
        let body = check_status(resp)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout_seconds))?;
        parse_quote(ticker, &body)
    }
}

// --- RSS ---

/// Parse the `<item>` entries of an RSS document. Items keep feed order.
pub fn parse_rss(ticker: &str, body: &str) -> Result<Vec<NewsItem>, ProviderError> {
    if !body.contains("<rss") && !body.contains("<channel") {
        return Err(ProviderError::Malformed("not an RSS document".to_string()));
    }

    let items = item_blocks(body)
        .into_iter()
        .map(|block| {
            let headline = tag_text(block, "title").unwrap_or_default();
            let url = tag_text(block, "link").filter(|l| !l.is_empty());
            let published_at = tag_text(block, "pubDate").and_then(|d| parse_rfc2822(&d));
            NewsItem {
                ticker: ticker.to_string(),
                headline,
                url,
                published_at,
                source: FEED_SOURCE.to_string(),
                channel: NewsChannel::Feed,
            }
        })
        .collect();
    Ok(items)
}

fn item_blocks(body: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<item") {
        let after = &rest[start + "<item".len()..];
        // Skip tags that merely start with "item", e.g. <itemCount>.
        if !after.starts_with('>') && !after.starts_with(char::is_whitespace) {
            rest = after;
            continue;
        }
        let Some(end) = after.find("</item>") else {
            break;
        };
        blocks.push(&after[..end]);
        rest = &after[end + "</item>".len()..];
    }
    blocks
}

/// Text content of the first `<tag>` element in `block`, decoded and trimmed.
fn tag_text(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search = block;
    loop {
        let start = search.find(&open)?;
        let after = &search[start + open.len()..];
        if after.starts_with('>') || after.starts_with(char::is_whitespace) {
            let content_start = after.find('>')? + 1;
            let content = &after[content_start..];
            let end = content.find(&close)?;
            return Some(decode_text(&content[..end]));
        }
        search = after;
    }
}

fn decode_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .map(str::to_string);
    match inner {
        Some(cdata) => cdata.trim().to_string(),
        None => decode_entities(trimmed),
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn parse_rfc2822(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// --- Search ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNews {
    title: Option<String>,
    link: Option<String>,
    publisher: Option<String>,
    provider_publish_time: Option<i64>,
}

pub fn parse_search(ticker: &str, body: &str) -> Result<Vec<NewsItem>, ProviderError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    Ok(parsed
        .news
        .into_iter()
        .map(|n| NewsItem {
            ticker: ticker.to_string(),
            headline: n.title.map(|t| t.trim().to_string()).unwrap_or_default(),
            url: n.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            published_at: n
                .provider_publish_time
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            source: n
                .publisher
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| SEARCH_SOURCE.to_string()),
            channel: NewsChannel::Search,
        })
        .collect())
}

// --- Trending ---

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    finance: TrendingFinance,
}

#[derive(Debug, Deserialize)]
struct TrendingFinance {
    #[serde(default)]
    result: Option<Vec<TrendingResult>>,
}

#[derive(Debug, Deserialize)]
struct TrendingResult {
    #[serde(default)]
    quotes: Vec<TrendingQuote>,
}

#[derive(Debug, Deserialize)]
struct TrendingQuote {
    symbol: Option<String>,
}

/// Distinct uppercase symbols from the first trending result, at most `limit`.
pub fn parse_trending(body: &str, limit: usize) -> Result<Vec<String>, ProviderError> {
    let parsed: TrendingResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let quotes = parsed
        .finance
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|r| r.quotes)
        .unwrap_or_default();

    let mut symbols: Vec<String> = Vec::new();
    for quote in quotes {
        let symbol = normalize_symbol(quote.symbol.as_deref().unwrap_or_default());
        if symbol.is_empty() {
            continue;
        }
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
        if symbols.len() >= limit {
            break;
        }
    }
    Ok(symbols)
}

// --- Quotes ---

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<RawQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    short_name: Option<String>,
    long_name: Option<String>,
    sector: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_change_percent: Option<f64>,
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<f64>,
}

pub fn parse_quote(ticker: &str, body: &str) -> Result<QuoteSnapshot, ProviderError> {
    let parsed: QuoteEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let quote = parsed
        .quote_response
        .result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed(format!("no quote returned for {ticker}")))?;

    Ok(QuoteSnapshot {
        name: quote
            .long_name
            .or(quote.short_name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        sector: quote
            .sector
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        price: quote.regular_market_price.and_then(to_decimal),
        previous_close: quote.regular_market_previous_close.and_then(to_decimal),
        change_pct: quote.regular_market_change_percent.and_then(to_decimal),
        market_cap: quote.market_cap.and_then(to_decimal),
        pe_ratio: quote.trailing_pe.or(quote.forward_pe).and_then(to_decimal),
    })
}

/// Convert via the shortest round-trip text form so 187.43 stays 187.43.
fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}
