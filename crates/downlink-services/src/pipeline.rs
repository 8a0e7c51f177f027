//! Pipeline orchestrator: drives one input through
//! compress → fragment → parity → transmit → recover → reassemble →
//! decompress → checksum verify, and hands back a report.
//!
//! A run never panics or exits on a pipeline failure. Every outcome, including
//! loss the parity scheme cannot repair, ends in a `RunReport` whose stats are
//! filled in as far as the run got.
//!
//! Codec calls run on the blocking pool under the configured timeout. Parity
//! generation is split across `parity_workers` blocking tasks; recovery runs
//! one blocking task per lost fragment.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::task::JoinSet;

use downlink_core::checksum::checksum;
use downlink_core::codec::{Codec, CodecError};
use downlink_core::config::PipelineConfig;
use downlink_core::fragment::{self, pair_of, sibling, Fragment};
use downlink_core::manifest::Manifest;
use downlink_core::parity::{compute_parity, recover, ParityError, ParityFragment};

use crate::channel::{self, LossPlan, Received};
use crate::error::{ChecksumScope, PipelineError};
use crate::stats::{LossCause, RecoveryOutcome, RecoveryRecord, RunStats, Stage, Warning};
use crate::storage;

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fragment_size: usize,
    /// `None` lets codec calls run unbounded.
    pub codec_timeout: Option<Duration>,
    /// Blocking tasks used for parity generation. Zero is treated as one.
    pub parity_workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            fragment_size: cfg.fragment_size,
            codec_timeout: cfg.codec_timeout(),
            parity_workers: cfg.workers(),
        }
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Terminal {
    Completed,
    Failed { stage: Stage, error: PipelineError },
}

impl Serialize for Terminal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Terminal::Completed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("state", "completed")?;
                map.end()
            }
            Terminal::Failed { stage, error } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("state", "failed")?;
                map.serialize_entry("stage", stage)?;
                map.serialize_entry("kind", error.kind())?;
                map.serialize_entry("message", &error.to_string())?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub terminal: Terminal,
    pub stats: RunStats,
    /// Decompressed output; present only when the run completed.
    #[serde(skip)]
    pub output: Option<Bytes>,
    /// Present once fragmentation ran.
    #[serde(skip)]
    pub manifest: Option<Manifest>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.terminal, Terminal::Completed)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.terminal {
            Terminal::Completed => None,
            Terminal::Failed { error, .. } => Some(error),
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.terminal {
            Terminal::Completed => None,
            Terminal::Failed { stage, .. } => Some(*stage),
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    codec: Arc<dyn Codec>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(codec: Arc<dyn Codec>, settings: PipelineSettings) -> Self {
        Self { codec, settings }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.codec.build(), PipelineSettings::from(cfg))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run an in-memory buffer through the pipeline.
    pub async fn run(&self, input: Bytes, plan: &LossPlan) -> RunReport {
        let mut run = Run::new(self);
        let result = run.execute(input, plan).await;
        run.into_report(result)
    }

    /// Read `input`, run it, and write the decompressed result to `output`.
    /// Nothing is written unless the run completes.
    pub async fn run_file(&self, input: &Path, output: &Path, plan: &LossPlan) -> RunReport {
        let mut run = Run::new(self);

        let t = Instant::now();
        let read = storage::read_input(input).await.map_err(PipelineError::from);
        let result = match run.finish(Stage::Read, t, read) {
            Ok(data) => run.execute(data, plan).await,
            Err(failure) => Err(failure),
        };

        let result = match result {
            Ok(out) => {
                let t = Instant::now();
                let written = storage::write_output(output, &out)
                    .await
                    .map_err(PipelineError::from);
                run.finish(Stage::Write, t, written).map(|()| out)
            }
            Err(failure) => Err(failure),
        };

        run.into_report(result)
    }

    /// Run one codec call on the blocking pool, bounded by the timeout. On
    /// expiry the call is abandoned; its eventual result is dropped.
    async fn call_codec<F>(&self, stage: Stage, call: F) -> Result<Bytes, PipelineError>
    where
        F: FnOnce(&dyn Codec) -> Result<Bytes, CodecError> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let handle = tokio::task::spawn_blocking(move || call(codec.as_ref()));

        let joined = match self.settings.codec_timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                PipelineError::CodecTimeout {
                    stage,
                    limit_ms: limit.as_millis() as u64,
                }
            })?,
            None => handle.await,
        };
        Ok(joined??)
    }

    async fn generate_parity(
        &self,
        fragments: &[Fragment],
    ) -> Result<Vec<ParityFragment>, PipelineError> {
        let (pairs, _) = fragment::pairs(fragments);
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let owned: Vec<(Fragment, Fragment)> = pairs
            .iter()
            .map(|p| (p.first.clone(), p.second.clone()))
            .collect();
        let per_worker = owned.len().div_ceil(self.settings.parity_workers.max(1));

        let mut tasks = JoinSet::new();
        for batch in owned.chunks(per_worker) {
            let batch = batch.to_vec();
            tasks.spawn_blocking(move || {
                batch
                    .iter()
                    .map(|(a, b)| compute_parity(a, b))
                    .collect::<Result<Vec<_>, ParityError>>()
            });
        }

        let mut parities = Vec::with_capacity(owned.len());
        while let Some(joined) = tasks.join_next().await {
            parities.extend(joined??);
        }
        parities.sort_by_key(ParityFragment::pair);
        Ok(parities)
    }

    /// Try to rebuild every missing data fragment. Rebuilt fragments are
    /// inserted into `received`; one record is returned per lost fragment.
    async fn recover_lost(
        &self,
        manifest: &Manifest,
        received: &mut Received,
    ) -> Result<Vec<RecoveryRecord>, PipelineError> {
        let unpaired = manifest.unpaired();
        let mut records = Vec::new();
        let mut tasks = JoinSet::new();

        for (index, expected) in received.missing(manifest) {
            if Some(index) == unpaired {
                records.push(unrecoverable(index, None, LossCause::Unprotected));
                continue;
            }
            let pair = pair_of(index);
            let Some(known) = received.data.get(&sibling(index)).cloned() else {
                records.push(unrecoverable(index, Some(pair), LossCause::SiblingLost));
                continue;
            };
            let Some(parity) = received.parity.get(&pair).cloned() else {
                records.push(unrecoverable(index, Some(pair), LossCause::ParityLost));
                continue;
            };
            tasks.spawn_blocking(move || (index, pair, recover(&known, &parity, expected)));
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, pair, result) = joined?;
            let outcome = match result {
                Ok(rebuilt) => {
                    let bytes = rebuilt.len();
                    received.data.insert(index, rebuilt);
                    RecoveryOutcome::Recovered { bytes }
                }
                Err(ParityError::IncompleteRecovery {
                    expected, covered, ..
                }) => RecoveryOutcome::Incomplete { expected, covered },
                Err(e) => return Err(e.into()),
            };
            records.push(RecoveryRecord {
                index,
                pair: Some(pair),
                outcome,
            });
        }

        for record in &records {
            match &record.outcome {
                RecoveryOutcome::Recovered { bytes } => {
                    tracing::debug!(index = record.index, pair = record.pair, bytes, "fragment recovered");
                }
                outcome => {
                    tracing::warn!(index = record.index, pair = record.pair, ?outcome, "fragment not recovered");
                }
            }
        }
        Ok(records)
    }
}

fn unrecoverable(index: u32, pair: Option<u32>, cause: LossCause) -> RecoveryRecord {
    RecoveryRecord {
        index,
        pair,
        outcome: RecoveryOutcome::Unrecoverable { cause },
    }
}

// ── Run ───────────────────────────────────────────────────────────────────────

struct Failure {
    stage: Stage,
    error: PipelineError,
}

/// State of a single run. Owns its stats; nothing is shared across runs.
struct Run<'p> {
    pipeline: &'p Pipeline,
    stats: RunStats,
    manifest: Option<Manifest>,
}

impl<'p> Run<'p> {
    fn new(pipeline: &'p Pipeline) -> Self {
        Self {
            pipeline,
            stats: RunStats::new(pipeline.codec.name(), pipeline.settings.fragment_size),
            manifest: None,
        }
    }

    /// Record the stage's timing and tag a failure with the stage it came from.
    fn finish<T>(
        &mut self,
        stage: Stage,
        started: Instant,
        result: Result<T, PipelineError>,
    ) -> Result<T, Failure> {
        let elapsed = started.elapsed();
        self.stats.timings.record(stage, elapsed);
        match result {
            Ok(value) => {
                tracing::info!(
                    stream_id = self.stats.stream_id.as_deref().unwrap_or("-"),
                    %stage,
                    elapsed_us = elapsed.as_micros() as u64,
                    "stage complete"
                );
                Ok(value)
            }
            Err(error) => Err(Failure { stage, error }),
        }
    }

    async fn execute(&mut self, input: Bytes, plan: &LossPlan) -> Result<Bytes, Failure> {
        let pipeline = self.pipeline;

        if input.is_empty() {
            return Err(Failure {
                stage: Stage::Read,
                error: PipelineError::InvalidArgument("input is empty".into()),
            });
        }

        // Compress
        let t = Instant::now();
        let raw = input.clone();
        let compressed = pipeline
            .call_codec(Stage::Compress, move |c| c.compress(&raw))
            .await;
        let compressed = self.finish(Stage::Compress, t, compressed)?;
        self.stats.record_sizes(input.len(), compressed.len());

        // Fragment
        let t = Instant::now();
        let size = pipeline.settings.fragment_size;
        let described = fragment::fragment(&compressed, size)
            .and_then(|fragments| {
                let manifest = Manifest::describe(
                    pipeline.codec.name(),
                    input.len(),
                    &compressed,
                    size,
                    &fragments,
                )?;
                Ok((fragments, manifest))
            })
            .map_err(PipelineError::from);
        let (fragments, manifest) = self.finish(Stage::Fragment, t, described)?;
        self.describe_stream(&manifest);
        self.manifest = Some(manifest.clone());

        // ParityGenerate
        let t = Instant::now();
        let parities = pipeline.generate_parity(&fragments).await;
        let parities = self.finish(Stage::ParityGenerate, t, parities)?;
        for p in parities.iter().filter(|p| p.is_partial()) {
            tracing::warn!(
                stream_id = %manifest.stream_id,
                pair = p.pair(),
                covered = p.covered(),
                first_len = p.first_len(),
                second_len = p.second_len(),
                "parity covers only part of its pair"
            );
            self.stats.warnings.push(Warning::PartialCoverageParity {
                pair: p.pair(),
                covered: p.covered(),
                first_len: p.first_len(),
                second_len: p.second_len(),
            });
        }

        // Transmit
        let t = Instant::now();
        let received = plan.validate(&manifest).and_then(|()| {
            channel::transmit(
                &manifest,
                &fragments,
                &parities,
                plan,
                &mut self.stats.transmission,
            )
        });
        let mut received = self.finish(Stage::Transmit, t, received)?;
        drop(fragments);
        drop(parities);

        // Recover
        let t = Instant::now();
        let records = pipeline.recover_lost(&manifest, &mut received).await;
        let records = self.finish(Stage::Recover, t, records)?;
        self.stats.record_recoveries(records);

        // Reassemble
        let t = Instant::now();
        let reassembled = self.reassemble(&manifest, &received);
        let reassembled = self.finish(Stage::Reassemble, t, reassembled)?;
        let reassembled_sum = checksum(&reassembled);
        self.stats.checksum.reassembled = Some(reassembled_sum);

        // Decompress
        let t = Instant::now();
        let original_len = manifest.original_len as usize;
        let output = pipeline
            .call_codec(Stage::Decompress, move |c| {
                c.decompress(&reassembled, original_len)
            })
            .await;
        let output = match output {
            // A damaged stream usually fails to decode before it can be
            // verified. The checksum disagreement is the root cause.
            Err(PipelineError::Codec(e)) if reassembled_sum != manifest.checksum => {
                tracing::warn!(stream_id = %manifest.stream_id, error = %e, "decompression failed on a corrupted stream");
                self.stats.timings.record(Stage::Decompress, t.elapsed());
                self.stats.checksum.matched = Some(false);
                return Err(Failure {
                    stage: Stage::ChecksumVerify,
                    error: PipelineError::ChecksumMismatch {
                        scope: ChecksumScope::Compressed,
                        expected: manifest.checksum,
                        actual: reassembled_sum,
                    },
                });
            }
            other => other,
        };
        let output = self.finish(Stage::Decompress, t, output)?;

        // ChecksumVerify
        let t = Instant::now();
        let verified = self.verify(&manifest, reassembled_sum, &input, &output);
        self.finish(Stage::ChecksumVerify, t, verified)?;

        Ok(output)
    }

    fn describe_stream(&mut self, manifest: &Manifest) {
        self.stats.stream_id = Some(manifest.stream_id.to_string());
        self.stats.fragment_count = manifest.fragment_count();
        self.stats.parity_count = manifest.parity_count();
        self.stats.unpaired_fragment = manifest.unpaired();
        self.stats.checksum.transmitted = Some(manifest.checksum);

        if let Some(index) = manifest.unpaired() {
            let len = manifest.fragment_len(index).unwrap_or_default();
            tracing::warn!(stream_id = %manifest.stream_id, index, len, "trailing fragment has no parity");
            self.stats.warnings.push(Warning::UnpairedFragment { index, len });
        }
    }

    /// Concatenate the received view. Any loss left after recovery fails the
    /// run; unrecoverable losses are reported ahead of incomplete ones.
    fn reassemble(&self, manifest: &Manifest, received: &Received) -> Result<Bytes, PipelineError> {
        let records = &self.stats.recoveries;

        let unrecoverable: Vec<u32> = records
            .iter()
            .filter(|r| matches!(r.outcome, RecoveryOutcome::Unrecoverable { .. }))
            .map(|r| r.index)
            .collect();
        if !unrecoverable.is_empty() {
            return Err(PipelineError::UnrecoverableLoss {
                indices: unrecoverable,
            });
        }

        if let Some(r) = records.iter().find(|r| !r.is_recovered()) {
            if let RecoveryOutcome::Incomplete { expected, covered } = r.outcome {
                return Err(PipelineError::IncompleteRecovery {
                    index: r.index,
                    expected,
                    covered,
                });
            }
        }

        let still_missing: Vec<u32> = received.missing(manifest).into_iter().map(|(i, _)| i).collect();
        if !still_missing.is_empty() {
            return Err(PipelineError::UnrecoverableLoss {
                indices: still_missing,
            });
        }

        let fragments: Vec<Fragment> = received.data.values().cloned().collect();
        Ok(fragment::reassemble(&fragments))
    }

    fn verify(
        &mut self,
        manifest: &Manifest,
        reassembled_sum: u32,
        input: &[u8],
        output: &[u8],
    ) -> Result<(), PipelineError> {
        let original = checksum(input);
        let restored = checksum(output);
        self.stats.checksum.payload_original = Some(original);
        self.stats.checksum.payload_restored = Some(restored);

        let result = if reassembled_sum != manifest.checksum {
            Err(PipelineError::ChecksumMismatch {
                scope: ChecksumScope::Compressed,
                expected: manifest.checksum,
                actual: reassembled_sum,
            })
        } else if restored != original {
            Err(PipelineError::ChecksumMismatch {
                scope: ChecksumScope::Payload,
                expected: original,
                actual: restored,
            })
        } else {
            Ok(())
        };
        self.stats.checksum.matched = Some(result.is_ok());
        result
    }

    fn into_report(self, result: Result<Bytes, Failure>) -> RunReport {
        let stream_id = self.stats.stream_id.as_deref().unwrap_or("-");
        let (terminal, output) = match result {
            Ok(out) => {
                tracing::info!(
                    stream_id,
                    original = self.stats.original_size,
                    compressed = self.stats.compressed_size,
                    recovered = self.stats.recovered,
                    total_us = self.stats.timings.total_us,
                    "run completed"
                );
                (Terminal::Completed, Some(out))
            }
            Err(Failure { stage, error }) => {
                if error.is_reportable_loss() {
                    tracing::warn!(stream_id, %stage, %error, "run failed");
                } else {
                    tracing::error!(stream_id, %stage, %error, "run aborted");
                }
                (Terminal::Failed { stage, error }, None)
            }
        };

        RunReport {
            terminal,
            stats: self.stats,
            output,
            manifest: self.manifest,
        }
    }
}
