use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pulse_models::config::ModelConfig;
use pulse_models::record_schema::RawOutputRecord;
use pulse_models::ticker::Ticker;
use pulse_providers::{CompletionRequest, LanguageModel};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::grounding::Grounding;
use crate::prompts::{system_prompt, user_prompt};

/// The model's raw reply plus the retries it took to get it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub raw: RawOutputRecord,
    pub retry_warnings: Vec<String>,
}

/// Issues the run's single model request, retrying transient failures.
pub struct ReportGenerator {
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
}

impl ReportGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, config: ModelConfig) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    /// Request the report. Transient errors are retried up to `max_attempts`
    /// in total with doubling backoff; anything else is `GenerationFailed`.
    pub async fn complete(
        &self,
        run_id: Uuid,
        api_key: &str,
        grounding: &Grounding,
        tickers: &[Ticker],
    ) -> Result<Completion, PipelineError> {
        let request = CompletionRequest {
            system: system_prompt(),
            user: user_prompt(grounding, tickers),
            temperature: self.config.temperature,
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut retry_warnings = Vec::new();

        for attempt in 1..=max_attempts {
            match self.model.complete(api_key, &request).await {
                Ok(content) => {
                    info!(
                        run_id = %run_id,
                        attempt,
                        chars = content.len(),
                        "Model reply received"
                    );
                    return Ok(Completion {
                        raw: RawOutputRecord {
                            run_id,
                            model: self.model.model().to_string(),
                            content,
                            recorded_at: Utc::now(),
                        },
                        retry_warnings,
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        run_id = %run_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    retry_warnings.push(format!("model attempt {attempt} failed ({e}); retrying"));
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    return Err(PipelineError::GenerationFailed(format!(
                        "attempt {attempt}/{max_attempts}: {e}"
                    )));
                }
            }
        }

        Err(PipelineError::GenerationFailed(
            "no attempts were made".to_string(),
        ))
    }
}
