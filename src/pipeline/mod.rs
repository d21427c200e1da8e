//! Pipeline orchestration: staged transform and persist workers connected by
//! bounded channels.

mod metrics;
mod stages;


pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use stages::{Pipeline, PipelineConfig, RunOutcome, RunReport};
