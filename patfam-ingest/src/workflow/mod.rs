//! Run orchestration: fetch → resolve → merge → tag → enrich → persist

pub mod pipeline;

pub use pipeline::{IngestPipeline, PipelineOutput};
