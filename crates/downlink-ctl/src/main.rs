//! downlink-ctl: run the telemetry downlink pipeline from the command line.
//!
//! stdout carries the JSON report (or command output); logs go to stderr.
//! Exit codes: 0 completed, 1 run failed, 2 usage or config error.

mod cmd;

use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use downlink_core::config::DownlinkConfig;

use cmd::generate::GenerateArgs;
use cmd::run::RunArgs;

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;

/// How long shutdown waits for blocking work still in flight. A codec call
/// abandoned after a timeout is never waited for past this.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn print_usage() {
    println!("Usage: downlink-ctl <command> [options]");
    println!();
    println!("Commands:");
    println!("  run <input> <output>   Compress, fragment, transmit, recover and verify a file");
    println!("  generate <path>        Write synthetic telemetry CSV");
    println!("  config init            Write the default config file if missing");
    println!("  config show            Print the effective config");
    println!();
    println!("Run options:");
    println!("  --fragment-size <N>    Fragment size in bytes (default: 65536)");
    println!("  --codec <lz4|none>     Compression codec (default: lz4)");
    println!("  --timeout-ms <N>       Per codec call limit, 0 = none (default: 30000)");
    println!("  --workers <N>          Parity worker tasks, 0 = all cores");
    println!("  --lose <i,j,...>       Drop these data fragments in transit");
    println!("  --lose-parity <k,...>  Drop these parity fragments in transit");
    println!("  --corrupt <i,...>      Flip a byte in these data fragments in transit");
    println!("  --manifest <path>      Write the stream manifest as JSON");
    println!("  --pretty               Pretty-print the JSON report");
    println!("  --summary              Print a human-readable summary to stderr");
    println!();
    println!("Generate options:");
    println!("  --rows <N>             Rows to write (default: 200000)");
    println!("  --seed <S>             Noise seed (default: 1)");
}

async fn dispatch(args: &[&str]) -> Result<u8> {
    match args {
        ["--version"] | ["-V"] => {
            println!("downlink-ctl {}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_OK)
        }
        [] | ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(EXIT_OK)
        }
        ["run", rest @ ..] => {
            let run_args = RunArgs::parse(rest)?;
            let config = DownlinkConfig::load()?;
            let completed = cmd::run::cmd_run(run_args, config).await?;
            Ok(if completed { EXIT_OK } else { EXIT_FAILED })
        }
        ["generate", rest @ ..] => {
            let gen_args = GenerateArgs::parse(rest)?;
            let config = DownlinkConfig::load()?;
            cmd::generate::cmd_generate(gen_args, &config.telemetry).await?;
            Ok(EXIT_OK)
        }
        ["config", "init"] => {
            cmd::config::cmd_init()?;
            Ok(EXIT_OK)
        }
        ["config", "show"] | ["config"] => {
            cmd::config::cmd_show(&DownlinkConfig::load()?)?;
            Ok(EXIT_OK)
        }
        other => anyhow::bail!("unknown command: {}", other.join(" ")),
    }
}

/// Run a command line to its exit status. Usage and config errors print to
/// stderr and map to 2.
async fn exit_status(args: &[&str]) -> u8 {
    match dispatch(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!();
            eprintln!("Run 'downlink-ctl help' for usage.");
            EXIT_USAGE
        }
    }
}

/// Drive `fut` on a fresh multi-thread runtime, then shut the runtime down
/// without waiting on abandoned blocking tasks.
fn block_on_then_shutdown<F: Future>(fut: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(fut);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match block_on_then_shutdown(exit_status(&args)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            ExitCode::FAILURE
        }
    }
}
