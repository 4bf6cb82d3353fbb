//! fiostream Core Library
//!
//! Turns the live output of a fio benchmark into InfluxDB time-series
//! points. Provides the streaming record framer, metric normalizer,
//! sink provisioning and delivery, benchmark process management,
//! configuration parsing and the pipeline state machine that ties them
//! together.

pub mod config;
pub mod error;
pub mod framer;
pub mod metric;
pub mod normalize;
pub mod pipeline;
pub mod process;
pub mod sink;
pub mod source;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{BenchmarkConfig, Config, ConfigLoader, PipelineConfig, SinkConfig};
pub use error::{
    FioStreamError, FioStreamResult, FrameError, HardValidationError, NormalizeError,
    ProcessError, SinkError,
};
pub use framer::{RawRecord, RecordFormat, RecordFramer};
pub use metric::CanonicalMetric;
pub use normalize::MetricNormalizer;
pub use pipeline::{Pipeline, PipelineObserver, PipelineSettings, RunSummary, SkipReason};
pub use process::BenchmarkProcess;
pub use sink::{CsvExporter, InfluxSink, MemorySink, MetricSink, ProvisionOutcome};
pub use source::{ChunkSource, ReaderSource};
pub use state::{PipelineState, PipelineStateMachine};
pub use types::{BucketName, OrgName, RunId};
