//! Pipeline error taxonomy.
//!
//! `InvalidArgument`, `Codec`, `CodecTimeout`, `Storage` and `Worker` abort a
//! run at the stage that raised them. `UnrecoverableLoss`,
//! `IncompleteRecovery` and `ChecksumMismatch` end the run as `Failed` after
//! the stats are complete. Partial parity coverage is never an error; it is
//! recorded as a `Warning`.

use std::fmt;

use downlink_core::codec::CodecError;
use downlink_core::fragment::FragmentError;
use downlink_core::parity::ParityError;
use downlink_core::wire::WireError;
use serde::Serialize;

use crate::stats::Stage;
use crate::storage::StorageError;

/// Which pair of checksums disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumScope {
    /// Compressed buffer before transmission vs after reassembly.
    Compressed,
    /// Raw input vs decompressed output.
    Payload,
}

impl fmt::Display for ChecksumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumScope::Compressed => f.write_str("compressed"),
            ChecksumScope::Payload => f.write_str("payload"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("codec call during {stage} exceeded {limit_ms} ms")]
    CodecTimeout { stage: Stage, limit_ms: u64 },

    #[error(
        "incomplete recovery of fragment {index}: expected {expected} bytes, parity covers {covered}"
    )]
    IncompleteRecovery {
        index: u32,
        expected: usize,
        covered: usize,
    },

    #[error("unrecoverable loss of fragments {indices:?}")]
    UnrecoverableLoss { indices: Vec<u32> },

    #[error("{scope} checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        scope: ChecksumScope,
        expected: u32,
        actual: u32,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("malformed frame: {0}")]
    Wire(#[from] WireError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Stable machine-readable name, used in the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidArgument(_) => "invalid_argument",
            PipelineError::Codec(_) => "codec_error",
            PipelineError::CodecTimeout { .. } => "codec_timeout",
            PipelineError::IncompleteRecovery { .. } => "incomplete_recovery",
            PipelineError::UnrecoverableLoss { .. } => "unrecoverable_loss",
            PipelineError::ChecksumMismatch { .. } => "checksum_mismatch",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::Wire(_) => "wire_error",
            PipelineError::Worker(_) => "worker_error",
        }
    }

    /// Loss and integrity failures: the run completed every stage it could and
    /// remediation (retransmission, retry) is up to the caller.
    pub fn is_reportable_loss(&self) -> bool {
        matches!(
            self,
            PipelineError::IncompleteRecovery { .. }
                | PipelineError::UnrecoverableLoss { .. }
                | PipelineError::ChecksumMismatch { .. }
        )
    }
}

impl From<FragmentError> for PipelineError {
    fn from(e: FragmentError) -> Self {
        PipelineError::InvalidArgument(e.to_string())
    }
}

impl From<ParityError> for PipelineError {
    fn from(e: ParityError) -> Self {
        match e {
            ParityError::IncompleteRecovery {
                index,
                expected,
                covered,
            } => PipelineError::IncompleteRecovery {
                index,
                expected,
                covered,
            },
            other => PipelineError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Worker(e.to_string())
    }
}
