use downlink_core::config::{DownlinkConfig, PipelineConfig};
use downlink_core::manifest::Manifest;
use downlink_services::{storage, telemetry, LossPlan, Pipeline, PipelineError, Stage};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  File runs
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_file_round_trip_with_losses() {
    let scratch = Scratch::new("round-trip");
    let input = scratch.path("telemetry.csv");
    let output = scratch.path("restored/telemetry.csv");
    let data = telemetry::generate(3_000, 1);
    storage::write_output(&input, &data).await.unwrap();

    let report = lz4(4096)
        .run_file(&input, &output, &LossPlan::lose_fragments([1, 2]))
        .await;

    assert!(report.is_completed(), "{:?}", report.terminal);
    assert_eq!(std::fs::read(&output).unwrap(), data.to_vec());
    assert!(report.stats.timings.read_us + report.stats.timings.write_us <= report.stats.timings.total_us);
}

#[tokio::test]
async fn test_failed_run_writes_nothing() {
    let scratch = Scratch::new("no-write");
    let input = scratch.path("in.bin");
    let output = scratch.path("out.bin");
    storage::write_output(&input, &ten_bytes()).await.unwrap();

    let report = passthrough(4)
        .run_file(&input, &output, &LossPlan::lose_fragments([0, 1]))
        .await;
    assert!(!report.is_completed());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_empty_and_missing_inputs() {
    let scratch = Scratch::new("bad-input");
    let empty = scratch.path("empty.bin");
    storage::write_output(&empty, &[]).await.unwrap();

    let report = passthrough(4)
        .run_file(&empty, &scratch.path("out.bin"), &LossPlan::none())
        .await;
    assert!(matches!(
        failure(&report),
        (Stage::Read, PipelineError::InvalidArgument(_))
    ));

    let report = passthrough(4)
        .run_file(&scratch.path("nope.bin"), &scratch.path("out.bin"), &LossPlan::none())
        .await;
    assert_eq!(failure(&report).1.kind(), "storage_error");
}

// ══════════════════════════════════════════════════════════════════════════════
//  Report & manifest
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_report_json_shape() {
    let report = passthrough(4)
        .run(ten_bytes(), &LossPlan::lose_fragments([0]))
        .await;
    let json: serde_json::Value = serde_json::from_str(&report.to_json(true).unwrap()).unwrap();

    assert_eq!(json["terminal"]["state"], "completed");
    assert_eq!(json["stats"]["codec"], "none");
    assert_eq!(json["stats"]["fragment_size"], 4);
    assert_eq!(json["stats"]["recoveries"][0]["outcome"], "recovered");
    assert_eq!(json["stats"]["warnings"][0]["kind"], "unpaired_fragment");
    assert!(json["stats"]["timings"]["total_us"].is_u64());
    assert_eq!(json["stats"]["stream_id"].as_str().map(str::len), Some(16));
}

#[tokio::test]
async fn test_manifest_describes_stream() {
    let scratch = Scratch::new("manifest");
    let report = passthrough(4).run(ten_bytes(), &LossPlan::none()).await;
    let manifest = report.manifest.expect("manifest after fragmentation");

    assert_eq!(manifest.fragment_lengths, vec![4, 4, 2]);
    assert_eq!(manifest.checksum, 45);
    assert_eq!(manifest.unpaired(), Some(2));

    let path = scratch.path("manifest.json");
    storage::write_output(&path, manifest.to_json().unwrap().as_bytes())
        .await
        .unwrap();
    let back: Manifest = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, manifest);
    assert_eq!(
        Some(back.stream_id.to_string()),
        report.stats.stream_id
    );
}

// ══════════════════════════════════════════════════════════════════════════════
//  Config
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_pipeline_from_config_file() {
    let scratch = Scratch::new("config");
    let path = scratch.path("config.toml");
    std::fs::write(
        &path,
        "[pipeline]\nfragment_size = 3\ncodec = \"none\"\nparity_workers = 2\n",
    )
    .unwrap();

    let config = DownlinkConfig::from_file(&path).unwrap();
    assert_eq!(config.pipeline.codec_timeout_ms, PipelineConfig::default().codec_timeout_ms);

    let pipeline = Pipeline::from_config(&config.pipeline);
    let report = pipeline.run(ten_bytes(), &LossPlan::lose_fragments([1])).await;
    assert!(report.is_completed());
    assert_eq!(report.stats.fragment_count, 4);
    assert_eq!(report.stats.codec, "none");
    assert!(scratch.root().exists());
}
