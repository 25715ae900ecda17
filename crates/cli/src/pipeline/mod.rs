//! Replay pipeline: log reader, estimator loop and run statistics.

mod estimator;
mod orchestrator;
mod record;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
