//! Run statistics: everything a pipeline run measured, assembled by the
//! orchestrator and returned with the report. Nothing here is global; each
//! run owns its own `RunStats`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

// ── Stages ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Compress,
    Fragment,
    ParityGenerate,
    Transmit,
    Recover,
    Reassemble,
    Decompress,
    ChecksumVerify,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Compress => "compress",
            Stage::Fragment => "fragment",
            Stage::ParityGenerate => "parity_generate",
            Stage::Transmit => "transmit",
            Stage::Recover => "recover",
            Stage::Reassemble => "reassemble",
            Stage::Decompress => "decompress",
            Stage::ChecksumVerify => "checksum_verify",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Wall-clock time per stage, in microseconds. Stages that did not run stay 0.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub read_us: u64,
    pub compress_us: u64,
    pub fragment_us: u64,
    pub parity_generate_us: u64,
    pub transmit_us: u64,
    pub recover_us: u64,
    pub reassemble_us: u64,
    pub decompress_us: u64,
    pub checksum_verify_us: u64,
    pub write_us: u64,
    pub total_us: u64,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        let slot = match stage {
            Stage::Read => &mut self.read_us,
            Stage::Compress => &mut self.compress_us,
            Stage::Fragment => &mut self.fragment_us,
            Stage::ParityGenerate => &mut self.parity_generate_us,
            Stage::Transmit => &mut self.transmit_us,
            Stage::Recover => &mut self.recover_us,
            Stage::Reassemble => &mut self.reassemble_us,
            Stage::Decompress => &mut self.decompress_us,
            Stage::ChecksumVerify => &mut self.checksum_verify_us,
            Stage::Write => &mut self.write_us,
        };
        *slot += us;
        self.total_us += us;
    }
}

// ── Warnings ──────────────────────────────────────────────────────────────────

/// Conditions that do not fail a run but must not go unnoticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Pair members differ in length; the longer one's tail has no parity.
    PartialCoverageParity {
        pair: u32,
        covered: usize,
        first_len: usize,
        second_len: usize,
    },
    /// Odd fragment count; the last fragment has no parity at all.
    UnpairedFragment { index: u32, len: usize },
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Why a lost fragment could not be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossCause {
    /// Both members of the pair were lost.
    SiblingLost,
    /// The pair's parity fragment was lost.
    ParityLost,
    /// The trailing unpaired fragment was lost; it never had parity.
    Unprotected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered { bytes: usize },
    Unrecoverable { cause: LossCause },
    Incomplete { expected: usize, covered: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryRecord {
    pub index: u32,
    /// Parity pair the fragment belongs to; `None` for the unpaired tail.
    pub pair: Option<u32>,
    #[serde(flatten)]
    pub outcome: RecoveryOutcome,
}

impl RecoveryRecord {
    pub fn is_recovered(&self) -> bool {
        matches!(self.outcome, RecoveryOutcome::Recovered { .. })
    }
}

// ── Transmission / checksums ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransmissionStats {
    pub frames_sent: usize,
    pub frames_dropped: usize,
    pub frames_corrupted: usize,
    pub bytes_on_wire: u64,
    pub lost_fragments: Vec<u32>,
    pub lost_parities: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChecksumStats {
    /// Compressed buffer before transmission.
    pub transmitted: Option<u32>,
    /// Compressed buffer after recovery and reassembly.
    pub reassembled: Option<u32>,
    /// Raw input.
    pub payload_original: Option<u32>,
    /// Decompressed output.
    pub payload_restored: Option<u32>,
    /// Set once verification ran.
    pub matched: Option<bool>,
}

// ── Run stats ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub stream_id: Option<String>,
    pub codec: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Compressed size as a percentage of the original size.
    pub compression_ratio_pct: f64,
    pub fragment_size: usize,
    pub fragment_count: usize,
    pub parity_count: usize,
    pub unpaired_fragment: Option<u32>,
    pub transmission: TransmissionStats,
    pub recovery_attempts: usize,
    pub recovered: usize,
    pub recoveries: Vec<RecoveryRecord>,
    pub checksum: ChecksumStats,
    pub warnings: Vec<Warning>,
    pub timings: StageTimings,
}

impl RunStats {
    pub fn new(codec: &str, fragment_size: usize) -> Self {
        Self {
            codec: codec.to_string(),
            fragment_size,
            ..Self::default()
        }
    }

    pub fn record_sizes(&mut self, original: usize, compressed: usize) {
        self.original_size = original as u64;
        self.compressed_size = compressed as u64;
        self.compression_ratio_pct = if original == 0 {
            0.0
        } else {
            compressed as f64 / original as f64 * 100.0
        };
    }

    pub fn record_recoveries(&mut self, mut records: Vec<RecoveryRecord>) {
        records.sort_by_key(|r| r.index);
        self.recovery_attempts = records.len();
        self.recovered = records.iter().filter(|r| r.is_recovered()).count();
        self.recoveries = records;
    }
}
