//! Scripted provider doubles for exercising the pipeline without network
//! access. Each double answers from a fixed script and counts its calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pulse_models::news::{NewsChannel, NewsItem};
use pulse_models::report::RunResult;
use pulse_providers::{
    CompletionRequest, LanguageModel, NewsProvider, ProviderError, QuoteProvider, QuoteSnapshot,
};
use tokio::sync::Notify;
use uuid::Uuid;

/// A feed-channel item dated 2024-10-16.
pub fn news_item(ticker: &str, headline: &str, url: &str) -> NewsItem {
    NewsItem {
        ticker: ticker.to_string(),
        headline: headline.to_string(),
        url: Some(url.to_string()),
        published_at: Utc.with_ymd_and_hms(2024, 10, 16, 14, 30, 0).single(),
        source: "Yahoo Finance RSS".to_string(),
        channel: NewsChannel::Feed,
    }
}

/// A search-channel item without a publish date.
pub fn search_item(ticker: &str, headline: &str, url: &str) -> NewsItem {
    NewsItem {
        ticker: ticker.to_string(),
        headline: headline.to_string(),
        url: Some(url.to_string()),
        published_at: None,
        source: "Reuters".to_string(),
        channel: NewsChannel::Search,
    }
}

/// An empty prior result.
pub fn sample_result() -> RunResult {
    RunResult {
        run_id: Uuid::new_v4(),
        markdown: "## Daily Brief\nNothing yet.".to_string(),
        tickers: vec![],
        sources: vec![],
        signals: vec![],
        indicators: vec![],
        generated_at: Utc::now(),
    }
}

// --- News ---

pub struct ScriptedNews {
    feeds: HashMap<String, Result<Vec<NewsItem>, String>>,
    searches: HashMap<String, Result<Vec<NewsItem>, String>>,
    trending: Result<Vec<String>, String>,
    trending_calls: AtomicUsize,
}

impl ScriptedNews {
    pub fn new() -> Self {
        Self {
            feeds: HashMap::new(),
            searches: HashMap::new(),
            trending: Ok(Vec::new()),
            trending_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_feed(mut self, ticker: &str, items: Vec<NewsItem>) -> Self {
        self.feeds.insert(ticker.to_string(), Ok(items));
        self
    }

    pub fn with_feed_failure(mut self, ticker: &str) -> Self {
        self.feeds
            .insert(ticker.to_string(), Err("feed unavailable".to_string()));
        self
    }

    pub fn with_search(mut self, ticker: &str, items: Vec<NewsItem>) -> Self {
        self.searches.insert(ticker.to_string(), Ok(items));
        self
    }

    pub fn with_search_failure(mut self, ticker: &str) -> Self {
        self.searches
            .insert(ticker.to_string(), Err("search unavailable".to_string()));
        self
    }

    pub fn with_trending(mut self, symbols: &[&str]) -> Self {
        self.trending = Ok(symbols.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_trending_failure(mut self) -> Self {
        self.trending = Err("trending unavailable".to_string());
        self
    }

    pub fn trending_calls(&self) -> usize {
        self.trending_calls.load(Ordering::SeqCst)
    }

    fn answer(
        script: &HashMap<String, Result<Vec<NewsItem>, String>>,
        ticker: &str,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        match script.get(ticker) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(msg)) => Err(ProviderError::Transport(msg.clone())),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for ScriptedNews {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsProvider for ScriptedNews {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn feed(&self, ticker: &str) -> Result<Vec<NewsItem>, ProviderError> {
        Self::answer(&self.feeds, ticker)
    }

    async fn search(
        &self,
        ticker: &str,
        _query: &str,
        count: usize,
    ) -> Result<Vec<NewsItem>, ProviderError> {
        let mut items = Self::answer(&self.searches, ticker)?;
        items.truncate(count);
        Ok(items)
    }

    async fn discover_trending(
        &self,
        _region: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        self.trending_calls.fetch_add(1, Ordering::SeqCst);
        match &self.trending {
            Ok(symbols) => Ok(symbols.iter().take(limit).cloned().collect()),
            Err(msg) => Err(ProviderError::Transport(msg.clone())),
        }
    }
}

// --- Quotes ---

/// Tickers without a scripted snapshot fail.
#[derive(Default)]
pub struct ScriptedQuotes {
    quotes: HashMap<String, QuoteSnapshot>,
}

impl ScriptedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, ticker: &str, snapshot: QuoteSnapshot) -> Self {
        self.quotes.insert(ticker.to_string(), snapshot);
        self
    }
}

#[async_trait]
impl QuoteProvider for ScriptedQuotes {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn quote(&self, ticker: &str) -> Result<QuoteSnapshot, ProviderError> {
        self.quotes
            .get(ticker)
            .cloned()
            .ok_or_else(|| ProviderError::Malformed(format!("no quote returned for {ticker}")))
    }
}

// --- Model ---

/// One scripted answer of the language model.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    RateLimited,
    Timeout,
    ServerError,
    Unauthorized,
}

impl ScriptedReply {
    fn into_result(self) -> Result<String, ProviderError> {
        match self {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::RateLimited => Err(ProviderError::RateLimited("slow down".to_string())),
            ScriptedReply::Timeout => Err(ProviderError::Timeout(60)),
            ScriptedReply::ServerError => Err(ProviderError::Status {
                status: 503,
                message: "overloaded".to_string(),
            }),
            ScriptedReply::Unauthorized => {
                Err(ProviderError::Unauthorized("invalid api key".to_string()))
            }
        }
    }
}

/// Answers completions from a queue. With a gate set, every completion
/// waits for `release()` first, which holds a run in the generate step.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Notify>>,
    accepted_keys: Vec<String>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            gate: None,
            accepted_keys: vec!["sk-test".to_string()],
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Let one gated completion proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The user prompt of the most recent completion request.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().map(|req| req.user.clone()))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(
        &self,
        _api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(ScriptedReply::ServerError);
        reply.into_result()
    }

    async fn list_models(&self, api_key: &str) -> Result<(), ProviderError> {
        if self.accepted_keys.iter().any(|k| k == api_key) {
            Ok(())
        } else {
            Err(ProviderError::Unauthorized("invalid api key".to_string()))
        }
    }
}
