//! `generate`: write a synthetic telemetry CSV.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use downlink_core::config::TelemetryConfig;
use downlink_services::{storage, telemetry};

use super::{flag_value, parse_number};

#[derive(Debug)]
pub struct GenerateArgs {
    pub path: PathBuf,
    pub rows: Option<usize>,
    pub seed: Option<u64>,
}

impl GenerateArgs {
    pub fn parse(args: &[&str]) -> Result<Self> {
        let mut path = None;
        let mut rows = None;
        let mut seed = None;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i];
            match flag {
                "--rows" => {
                    rows = Some(parse_number(flag_value(args, i, flag)?, flag)?);
                    i += 1;
                }
                "--seed" => {
                    seed = Some(parse_number(flag_value(args, i, flag)?, flag)?);
                    i += 1;
                }
                other if other.starts_with("--") => bail!("unknown option: {other}"),
                other if path.is_none() => path = Some(PathBuf::from(other)),
                other => bail!("unexpected argument: {other}"),
            }
            i += 1;
        }

        let path = path.context("generate expects <path>")?;
        Ok(Self { path, rows, seed })
    }
}

pub async fn cmd_generate(args: GenerateArgs, defaults: &TelemetryConfig) -> Result<()> {
    let rows = args.rows.unwrap_or(defaults.rows);
    let seed = args.seed.unwrap_or(defaults.seed);

    let csv = telemetry::generate(rows, seed);
    storage::write_output(&args.path, &csv).await?;

    tracing::info!(path = %args.path.display(), rows, seed, bytes = csv.len(), "telemetry written");
    println!(
        "Wrote {} rows ({} bytes) to {}",
        rows,
        csv.len(),
        args.path.display()
    );
    Ok(())
}
