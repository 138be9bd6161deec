use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which provider channel produced a news item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NewsChannel {
    Feed,
    Search,
}

/// A single headline gathered for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub ticker: String,
    pub headline: String,
    /// Canonical article URL. Absent when the provider returned none.
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Publisher or feed label, e.g. "Yahoo Finance RSS".
    pub source: String,
    pub channel: NewsChannel,
}

impl NewsItem {
    /// Uniqueness key within a run: the URL when present, else ticker + headline.
    ///
    /// Callers are expected to have canonicalized `url` before computing keys.
    pub fn dedup_key(&self) -> String {
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => format!("url:{url}"),
            None => format!(
                "headline:{}:{}",
                self.ticker,
                self.headline.trim().to_lowercase()
            ),
        }
    }

    /// Whether this item can be cited (it carries a URL).
    pub fn is_citable(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}
