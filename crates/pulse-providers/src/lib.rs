//! Capability interfaces for the external collaborators of a run (news,
//! quotes, language model) and their HTTP implementations.

pub mod error;
mod http;
pub mod openai;
pub mod traits;
pub mod yahoo;

pub use error::ProviderError;
pub use openai::OpenAiClient;
pub use traits::{CompletionRequest, LanguageModel, NewsProvider, QuoteProvider, QuoteSnapshot};
pub use yahoo::{YahooNews, YahooQuotes};
