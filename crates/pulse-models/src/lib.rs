pub mod config;
pub mod indicator;
pub mod news;
pub mod progress;
pub mod record_schema;
pub mod report;
pub mod ticker;

pub use config::PulseConfig;
pub use indicator::{IndicatorSet, Metric};
pub use news::{NewsChannel, NewsItem};
pub use progress::{ProgressEvent, RunState, Step, StepStatus};
pub use report::{RunResult, Signal, SignalAction, Source};
pub use ticker::{Ticker, TickerProvenance};
