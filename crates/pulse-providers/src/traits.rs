use async_trait::async_trait;
use pulse_models::news::NewsItem;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Headline sources for a ticker plus trending-ticker discovery.
/// Every call may fail independently.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Headlines from the ticker's feed channel.
    async fn feed(&self, ticker: &str) -> Result<Vec<NewsItem>, ProviderError>;

    /// Headlines from the keyword-search channel.
    async fn search(
        &self,
        ticker: &str,
        query: &str,
        count: usize,
    ) -> Result<Vec<NewsItem>, ProviderError>;

    /// Currently trending symbols for a region, at most `limit`.
    async fn discover_trending(
        &self,
        region: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Quote metrics as reported by the provider. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub price: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub change_pct: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(&self, ticker: &str) -> Result<QuoteSnapshot, ProviderError>;
}

/// A single structured request to the language model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

/// The language-model capability. Replies are opaque text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError>;

    /// Lightweight probe used to validate a credential.
    async fn list_models(&self, api_key: &str) -> Result<(), ProviderError>;
}
