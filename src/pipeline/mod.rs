//! Segment enhancement pipeline.
//!
//! Components run synchronously in configured order; each one's output is
//! the next one's input. A failing component degrades the run instead of
//! aborting it.

pub mod component;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod refiner;
pub mod splitter;
pub mod vad_filter;

pub use component::{ComponentKind, Enhancer, PipelineContext, build_components, parse_components};
pub use error::{ComponentError, ErrorReporter, LogReporter};
pub use metrics::{ComponentReport, PipelineMetrics};
pub use orchestrator::{Pipeline, PipelineOutput};
pub use refiner::TimestampRefiner;
pub use splitter::SegmentSplitter;
pub use vad_filter::VadFilter;
