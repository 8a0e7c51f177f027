//! Downlink integration test harness.
//!
//! Drives whole runs through `Pipeline` the way `downlink-ctl` does: real
//! files on disk, real codecs, losses injected by the simulated channel.
//!
//!   cargo test --test integration
//!
//! Each test works in its own scratch directory under the system temp dir.

mod files;
mod scenarios;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use downlink_core::codec::{Codec, Lz4Codec, PassthroughCodec};
use downlink_services::{Pipeline, PipelineError, PipelineSettings, RunReport, Stage, Terminal};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Scratch directory removed on drop.
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(name: &str) -> Self {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "downlink-it-{}-{}-{}",
            name,
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self { dir }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn root(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

pub fn pipeline_with(codec: Arc<dyn Codec>, fragment_size: usize) -> Pipeline {
    Pipeline::new(
        codec,
        PipelineSettings {
            fragment_size,
            codec_timeout: Some(Duration::from_secs(10)),
            parity_workers: 4,
        },
    )
}

pub fn passthrough(fragment_size: usize) -> Pipeline {
    pipeline_with(Arc::new(PassthroughCodec), fragment_size)
}

pub fn lz4(fragment_size: usize) -> Pipeline {
    pipeline_with(Arc::new(Lz4Codec), fragment_size)
}

/// The ten-byte stream `[0, 1, ..., 9]`.
pub fn ten_bytes() -> Bytes {
    Bytes::from((0u8..10).collect::<Vec<_>>())
}

/// Stage and error of a failed run; panics if it completed.
pub fn failure(report: &RunReport) -> (Stage, &PipelineError) {
    match &report.terminal {
        Terminal::Failed { stage, error } => (*stage, error),
        Terminal::Completed => panic!("run completed: {:?}", report.stats),
    }
}
