//! downlink-services: the pipeline orchestrator and its collaborators:
//! simulated lossy channel, run statistics, file storage and the synthetic
//! telemetry source.

pub mod channel;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod storage;
pub mod telemetry;

pub use channel::LossPlan;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineSettings, RunReport, Terminal};
pub use stats::{RecoveryOutcome, RecoveryRecord, RunStats, Stage, Warning};
