pub mod error;
pub mod generator;
pub mod grounding;
pub mod indicators;
pub mod news;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod selector;

pub mod test_support;

pub use error::PipelineError;
pub use grounding::{assemble, Grounding};
pub use pipeline::BriefService;
pub use progress::{ProgressHub, ProgressStream, RunTracker};
