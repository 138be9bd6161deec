use std::collections::HashSet;
use std::sync::Arc;

use pulse_models::config::NewsConfig;
use pulse_models::news::NewsItem;
use pulse_providers::NewsProvider;
use reqwest::Url;
use tracing::{debug, warn};

/// Query parameters that only carry campaign or referrer tracking.
const TRACKING_PARAMS: &[&str] = &[
    "guccounter",
    "guce_referrer",
    "guce_referrer_sig",
    "fbclid",
    "gclid",
    "ncid",
    ".tsrc",
    "soc_src",
    "soc_trk",
    "mc_cid",
    "mc_eid",
    "yptr",
];

/// Headlines gathered for one ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsFetch {
    pub items: Vec<NewsItem>,
    pub warnings: Vec<String>,
}

/// Queries both news channels for a ticker and merges them.
pub struct NewsAggregator {
    provider: Arc<dyn NewsProvider>,
    search_count: usize,
    max_items: usize,
}

impl NewsAggregator {
    pub fn new(provider: Arc<dyn NewsProvider>, config: &NewsConfig) -> Self {
        Self {
            provider,
            search_count: config.search_count,
            max_items: config.max_items_per_ticker,
        }
    }

    /// Feed and search run concurrently. A failed channel contributes nothing
    /// and a warning.
    pub async fn fetch(&self, ticker: &str) -> NewsFetch {
        let (feed, search) = tokio::join!(
            self.provider.feed(ticker),
            self.provider.search(ticker, ticker, self.search_count)
        );

        let mut warnings = Vec::new();
        let feed = feed.unwrap_or_else(|e| {
            warn!(ticker, error = %e, "Feed channel failed");
            warnings.push(format!("{ticker}: feed unavailable ({e})"));
            Vec::new()
        });
        let search = search.unwrap_or_else(|e| {
            warn!(ticker, error = %e, "Search channel failed");
            warnings.push(format!("{ticker}: search unavailable ({e})"));
            Vec::new()
        });

        let (feed_count, search_count) = (feed.len(), search.len());
        let items = merge_channels(feed, search, self.max_items);
        debug!(ticker, feed_count, search_count, kept = items.len(), "News merged");
        NewsFetch { items, warnings }
    }
}

/// Feed items first, then search items not already seen. URLs are
/// canonicalized, empty headlines dropped, and the result capped at `cap`.
///
/// Merging an already-merged list again yields the same list.
pub fn merge_channels(feed: Vec<NewsItem>, search: Vec<NewsItem>, cap: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for mut item in feed.into_iter().chain(search) {
        if merged.len() >= cap {
            break;
        }
        item.headline = item.headline.trim().to_string();
        if item.headline.is_empty() {
            continue;
        }
        item.url = item
            .url
            .as_deref()
            .map(canonical_url)
            .filter(|u| !u.is_empty());
        if seen.insert(item.dedup_key()) {
            merged.push(item);
        }
    }
    merged
}

/// Canonical form of an article URL, used for dedup and Source numbering.
///
/// Scheme and host are lowercased and default ports dropped by the parser.
/// The fragment and tracking parameters are removed, remaining parameters
/// keep their order, and a trailing slash is removed from non-root paths.
/// Strings that do not parse as URLs are returned trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}
