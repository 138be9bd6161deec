use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage a progress event refers to. `Run` marks the terminal event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    SelectTickers,
    FetchNews,
    FetchIndicators,
    Assemble,
    Generate,
    Persist,
    Run,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::SelectTickers => "select_tickers",
            Step::FetchNews => "fetch_news",
            Step::FetchIndicators => "fetch_indicators",
            Step::Assemble => "assemble",
            Step::Generate => "generate",
            Step::Persist => "persist",
            Step::Run => "run",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Ok,
    Warning,
    Failed,
}

/// One entry of a run's append-only progress log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    /// Strictly increasing within a run, starting at 1.
    pub seq: u64,
    pub step: Step,
    pub status: StepStatus,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    /// The terminal event closes the run's log; nothing follows it.
    pub fn is_terminal(&self) -> bool {
        self.step == Step::Run && matches!(self.status, StepStatus::Ok | StepStatus::Failed)
    }
}

/// Lifecycle of the single run slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}
