use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use pulse_models::config::PulseConfig;
use pulse_models::indicator::IndicatorSet;
use pulse_models::news::NewsItem;
use pulse_models::progress::{RunState, Step};
use pulse_models::report::RunResult;
use pulse_models::ticker::Ticker;
use pulse_providers::{LanguageModel, NewsProvider, ProviderError, QuoteProvider};
use pulse_store::Persistence;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::generator::ReportGenerator;
use crate::grounding::{assemble, Grounding};
use crate::indicators::fetch_indicators;
use crate::news::{NewsAggregator, NewsFetch};
use crate::progress::{ProgressHub, ProgressStream, RunTracker};
use crate::report::validate_report;
use crate::selector::select_tickers;

const CREDENTIAL_PREFIX: &str = "sk-";

/// The pipeline surface exposed to hosts (HTTP server, CLI).
///
/// Cheap to clone; all clones share the run lock, logs and store.
#[derive(Clone)]
pub struct BriefService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: PulseConfig,
    store: Arc<Persistence>,
    news: Arc<dyn NewsProvider>,
    quotes: Arc<dyn QuoteProvider>,
    aggregator: NewsAggregator,
    generator: ReportGenerator,
    model: Arc<dyn LanguageModel>,
    hub: Arc<ProgressHub>,
}

impl BriefService {
    pub fn new(
        config: PulseConfig,
        store: Arc<Persistence>,
        news: Arc<dyn NewsProvider>,
        quotes: Arc<dyn QuoteProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let aggregator = NewsAggregator::new(Arc::clone(&news), &config.news);
        let generator = ReportGenerator::new(Arc::clone(&model), config.model.clone());
        let hub = ProgressHub::new(&config.progress);
        Self {
            inner: Arc::new(ServiceInner {
                config,
                store,
                news,
                quotes,
                aggregator,
                generator,
                model,
                hub,
            }),
        }
    }

    /// Start a run in the background and return its id immediately.
    pub async fn start_run(&self) -> Result<Uuid, PipelineError> {
        let api_key = self.resolve_credential()?;
        let tracker = self.inner.hub.try_begin()?;
        let run_id = tracker.run_id();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // The outcome is reported through the run's events.
            let _ = inner.drive(tracker, &api_key).await;
        });
        Ok(run_id)
    }

    /// Run the pipeline inline and return its result.
    pub async fn run_once(&self) -> Result<RunResult, PipelineError> {
        let api_key = self.resolve_credential()?;
        let tracker = self.inner.hub.try_begin()?;
        self.inner.drive(tracker, &api_key).await
    }

    pub fn subscribe_progress(
        &self,
        run_id: Uuid,
        from_seq: u64,
    ) -> Result<ProgressStream, PipelineError> {
        self.inner.hub.subscribe(run_id, from_seq)
    }

    pub fn get_last_result(&self) -> Result<Option<RunResult>, PipelineError> {
        Ok(self.inner.store.load_last()?)
    }

    pub fn run_state(&self) -> RunState {
        self.inner.hub.state()
    }

    pub fn current_run(&self) -> Option<Uuid> {
        self.inner.hub.current_run()
    }

    /// Check a credential's format, probe it against the model API, and
    /// store it on success.
    pub async fn validate_and_store_credential(&self, secret: &str) -> Result<(), PipelineError> {
        let secret = secret.trim();
        check_credential_format(secret)?;

        match self.inner.model.list_models(secret).await {
            Ok(()) => {
                self.inner.store.save_credential(secret)?;
                info!("Credential validated and stored");
                Ok(())
            }
            Err(ProviderError::Unauthorized(msg)) => Err(PipelineError::CredentialInvalid(
                format!("rejected by provider: {msg}"),
            )),
            Err(e) => Err(PipelineError::CredentialInvalid(format!(
                "could not be verified: {e}"
            ))),
        }
    }

    /// The stored credential, else the configured environment variable.
    fn resolve_credential(&self) -> Result<String, PipelineError> {
        if let Some(stored) = self.inner.store.load_credential()? {
            return Ok(stored);
        }
        let env_name = &self.inner.config.model.credential_env;
        match std::env::var(env_name) {
            Ok(value) if !value.trim().is_empty() => {
                let value = value.trim().to_string();
                check_credential_format(&value)?;
                Ok(value)
            }
            _ => Err(PipelineError::CredentialInvalid(format!(
                "no credential stored and {env_name} is not set"
            ))),
        }
    }
}

fn check_credential_format(secret: &str) -> Result<(), PipelineError> {
    if secret.is_empty() {
        return Err(PipelineError::CredentialInvalid("credential is empty".to_string()));
    }
    if !secret.starts_with(CREDENTIAL_PREFIX) {
        return Err(PipelineError::CredentialInvalid(format!(
            "credential must start with {CREDENTIAL_PREFIX}"
        )));
    }
    Ok(())
}

impl ServiceInner {
    /// Execute a run and close its log with the terminal event.
    async fn drive(&self, tracker: RunTracker, api_key: &str) -> Result<RunResult, PipelineError> {
        let start = Instant::now();
        match self.execute(&tracker, api_key).await {
            Ok(result) => {
                info!(
                    run_id = %result.run_id,
                    tickers = result.tickers.len(),
                    sources = result.sources.len(),
                    signals = result.signals.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Run finished"
                );
                tracker.complete(format!(
                    "{} signals, {} sources",
                    result.signals.len(),
                    result.sources.len()
                ));
                Ok(result)
            }
            Err((step, e)) => {
                tracker.failed(step, e.to_string());
                tracker.fail(step, &e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        tracker: &RunTracker,
        api_key: &str,
    ) -> Result<RunResult, (Step, PipelineError)> {
        let run_id = tracker.run_id();

        // 1. Select tickers
        tracker.started(Step::SelectTickers, "");
        let prior = self.store.load_last().unwrap_or_else(|e| {
            tracker.warning(Step::SelectTickers, format!("last result unreadable: {e}"));
            None
        });
        let selection = select_tickers(prior.as_ref(), self.news.as_ref(), &self.config.selection)
            .await
            .map_err(|e| (Step::SelectTickers, e))?;
        for warning in &selection.warnings {
            tracker.warning(Step::SelectTickers, warning.as_str());
        }
        let tickers = selection.tickers;
        tracker.finish_step(Step::SelectTickers, selection.warnings.len(), symbols(&tickers));

        // 2. Fetch news and indicators concurrently
        tracker.started(Step::FetchNews, "");
        tracker.started(Step::FetchIndicators, "");
        let (news, indicators) = tokio::join!(self.fetch_news(&tickers), self.fetch_quotes(&tickers));

        let mut news_by_ticker: HashMap<String, Vec<NewsItem>> = HashMap::new();
        let mut news_warnings = 0;
        for (ticker, fetch) in news {
            for warning in &fetch.warnings {
                tracker.warning(Step::FetchNews, warning.as_str());
            }
            news_warnings += fetch.warnings.len();
            news_by_ticker.insert(ticker, fetch.items);
        }
        let item_count: usize = news_by_ticker.values().map(Vec::len).sum();
        tracker.finish_step(Step::FetchNews, news_warnings, format!("{item_count} items"));

        let mut indicators_by_ticker: HashMap<String, IndicatorSet> = HashMap::new();
        let mut quote_warnings = 0;
        for (set, warning) in indicators {
            if let Some(warning) = warning {
                tracker.warning(Step::FetchIndicators, warning);
                quote_warnings += 1;
            }
            indicators_by_ticker.insert(set.ticker.clone(), set);
        }
        let available = indicators_by_ticker.values().filter(|s| s.is_available()).count();
        tracker.finish_step(
            Step::FetchIndicators,
            quote_warnings,
            format!("{available}/{} tickers with data", tickers.len()),
        );

        // 3. Assemble grounding
        tracker.started(Step::Assemble, "");
        let grounding: Grounding = assemble(
            &tickers,
            &news_by_ticker,
            &indicators_by_ticker,
            self.config.pipeline.max_sources,
        );
        tracker.ok(
            Step::Assemble,
            format!(
                "{} sources, key indicators {}",
                grounding.source_count(),
                if grounding.include_indicators { "included" } else { "omitted" }
            ),
        );

        // 4. Generate and validate
        tracker.started(Step::Generate, self.generator.model_name());
        let completion = self
            .generator
            .complete(run_id, api_key, &grounding, &tickers)
            .await
            .map_err(|e| (Step::Generate, e))?;
        for warning in &completion.retry_warnings {
            tracker.warning(Step::Generate, warning.as_str());
        }
        if let Err(e) = self.store.save_raw_output(&completion.raw) {
            warn!(run_id = %run_id, error = %e, "Raw model output not saved");
            tracker.warning(Step::Generate, format!("raw output not saved: {e}"));
        }
        let report = validate_report(run_id, &completion.raw.content, &grounding, &tickers)
            .map_err(|e| (Step::Generate, e))?;
        for warning in &report.warnings {
            tracker.warning(Step::Generate, warning.as_str());
        }
        tracker.finish_step(
            Step::Generate,
            completion.retry_warnings.len() + report.warnings.len(),
            format!("{} signals", report.result.signals.len()),
        );

        // 5. Persist
        tracker.started(Step::Persist, "");
        self.store
            .save_result(&report.result)
            .map_err(|e| (Step::Persist, PipelineError::from(e)))?;
        tracker.ok(Step::Persist, "last result replaced");

        Ok(report.result)
    }

    async fn fetch_news(&self, tickers: &[Ticker]) -> Vec<(String, NewsFetch)> {
        stream::iter(owned_symbols(tickers))
            .map(|symbol| async move {
                let fetch = self.aggregator.fetch(&symbol).await;
                (symbol, fetch)
            })
            .buffered(self.config.pipeline.fetch_concurrency.max(1))
            .collect()
            .await
    }

    async fn fetch_quotes(&self, tickers: &[Ticker]) -> Vec<(IndicatorSet, Option<String>)> {
        stream::iter(owned_symbols(tickers))
            .map(|symbol| async move { fetch_indicators(self.quotes.as_ref(), &symbol).await })
            .buffered(self.config.pipeline.fetch_concurrency.max(1))
            .collect()
            .await
    }
}

/// Owned symbols, so the fetch streams borrow nothing from the ticker slice.
fn owned_symbols(tickers: &[Ticker]) -> Vec<String> {
    tickers.iter().map(|t| t.symbol.clone()).collect()
}

fn symbols(tickers: &[Ticker]) -> String {
    tickers
        .iter()
        .map(|t| t.symbol.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
