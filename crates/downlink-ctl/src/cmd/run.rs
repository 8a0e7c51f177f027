//! `run`: push a file through the pipeline and print the JSON report.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use downlink_core::codec::CodecKind;
use downlink_core::config::DownlinkConfig;
use downlink_services::stats::RecoveryOutcome;
use downlink_services::{storage, LossPlan, Pipeline, RunReport};

use super::{flag_value, parse_number};

#[derive(Debug, Default)]
pub struct RunArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub fragment_size: Option<usize>,
    pub codec: Option<CodecKind>,
    pub timeout_ms: Option<u64>,
    pub workers: Option<usize>,
    pub plan: LossPlan,
    pub manifest: Option<PathBuf>,
    pub pretty: bool,
    pub summary: bool,
}

impl RunArgs {
    pub fn parse(args: &[&str]) -> Result<Self> {
        let mut parsed = RunArgs::default();
        let mut positional = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i];
            match flag {
                "--fragment-size" => {
                    parsed.fragment_size = Some(parse_number(flag_value(args, i, flag)?, flag)?);
                    i += 1;
                }
                "--codec" => {
                    let value = flag_value(args, i, flag)?;
                    parsed.codec = Some(value.parse().map_err(anyhow::Error::msg)?);
                    i += 1;
                }
                "--timeout-ms" => {
                    parsed.timeout_ms = Some(parse_number(flag_value(args, i, flag)?, flag)?);
                    i += 1;
                }
                "--workers" => {
                    parsed.workers = Some(parse_number(flag_value(args, i, flag)?, flag)?);
                    i += 1;
                }
                "--lose" => {
                    parsed.plan.fragments = loss_list(flag_value(args, i, flag)?, flag)?;
                    i += 1;
                }
                "--lose-parity" => {
                    parsed.plan.parities = loss_list(flag_value(args, i, flag)?, flag)?;
                    i += 1;
                }
                "--corrupt" => {
                    parsed.plan.corrupt = loss_list(flag_value(args, i, flag)?, flag)?;
                    i += 1;
                }
                "--manifest" => {
                    parsed.manifest = Some(PathBuf::from(flag_value(args, i, flag)?));
                    i += 1;
                }
                "--pretty" => parsed.pretty = true,
                "--summary" => parsed.summary = true,
                other if other.starts_with("--") => bail!("unknown option: {other}"),
                other => positional.push(other),
            }
            i += 1;
        }

        match positional.as_slice() {
            [input, output] => {
                parsed.input = PathBuf::from(input);
                parsed.output = PathBuf::from(output);
            }
            _ => bail!("run expects <input> <output>"),
        }
        match parsed.fragment_size {
            Some(0) => bail!("--fragment-size must be at least 1"),
            Some(size) if u32::try_from(size).is_err() => {
                bail!("--fragment-size must be at most {}", u32::MAX)
            }
            _ => {}
        }
        Ok(parsed)
    }

    /// Flags override whatever the config file and environment resolved to.
    pub fn apply(&self, config: &mut DownlinkConfig) {
        if let Some(size) = self.fragment_size {
            config.pipeline.fragment_size = size;
        }
        if let Some(codec) = self.codec {
            config.pipeline.codec = codec;
        }
        if let Some(ms) = self.timeout_ms {
            config.pipeline.codec_timeout_ms = ms;
        }
        if let Some(workers) = self.workers {
            config.pipeline.parity_workers = workers;
        }
        if self.pretty {
            config.report.pretty = true;
        }
    }
}

fn loss_list(value: &str, flag: &str) -> Result<std::collections::BTreeSet<u32>> {
    LossPlan::parse_list(value).map_err(|e| anyhow::anyhow!("{flag}: {e}"))
}

/// Returns whether the run completed.
pub async fn cmd_run(args: RunArgs, mut config: DownlinkConfig) -> Result<bool> {
    args.apply(&mut config);

    let pipeline = Pipeline::from_config(&config.pipeline);
    tracing::debug!(
        settings = ?pipeline.settings(),
        lossless = args.plan.is_empty(),
        "starting run"
    );
    let report = pipeline.run_file(&args.input, &args.output, &args.plan).await;

    if let (Some(path), Some(manifest)) = (&args.manifest, &report.manifest) {
        let json = manifest.to_json().context("failed to serialize manifest")?;
        storage::write_output(path, json.as_bytes())
            .await
            .with_context(|| format!("failed to write manifest to {}", path.display()))?;
    }

    if args.summary {
        print_summary(&report);
    }
    println!(
        "{}",
        report
            .to_json(config.report.pretty)
            .context("failed to serialize report")?
    );

    Ok(report.is_completed())
}

fn print_summary(report: &RunReport) {
    let s = &report.stats;
    let state = match (report.failed_stage(), report.error()) {
        (Some(stage), Some(e)) => format!("failed at {stage}: {e}"),
        _ => "completed".to_string(),
    };

    eprintln!("═══════════════════════════════════════");
    eprintln!("  Downlink Run");
    eprintln!("═══════════════════════════════════════");
    eprintln!("  Stream          : {}", s.stream_id.as_deref().unwrap_or("-"));
    eprintln!("  Result          : {state}");
    eprintln!("  Codec           : {}", s.codec);
    eprintln!(
        "  Size            : {} → {} bytes ({:.1}%)",
        s.original_size, s.compressed_size, s.compression_ratio_pct
    );
    eprintln!(
        "  Fragments       : {} x {} bytes, {} parity",
        s.fragment_count, s.fragment_size, s.parity_count
    );
    eprintln!(
        "  Lost            : {} data, {} parity",
        s.transmission.lost_fragments.len(),
        s.transmission.lost_parities.len()
    );
    eprintln!("  Recovered       : {}/{}", s.recovered, s.recovery_attempts);
    eprintln!("  Total time      : {} µs", s.timings.total_us);

    if !s.recoveries.is_empty() {
        eprintln!("\n  Recoveries:");
        for r in &s.recoveries {
            let outcome = match &r.outcome {
                RecoveryOutcome::Recovered { bytes } => format!("recovered ({bytes} bytes)"),
                RecoveryOutcome::Unrecoverable { cause } => format!("unrecoverable ({cause:?})"),
                RecoveryOutcome::Incomplete { expected, covered } => {
                    format!("incomplete ({covered}/{expected} bytes covered)")
                }
            };
            eprintln!("  ├─ fragment {:<6} {outcome}", r.index);
        }
    }
    if !s.warnings.is_empty() {
        eprintln!("\n  Warnings: {}", s.warnings.len());
    }
}
