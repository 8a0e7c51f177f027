use downlink_core::fragment::fragment;
use downlink_core::parity::compute_parity;
use downlink_services::stats::{LossCause, RecoveryOutcome};
use downlink_services::telemetry;
use downlink_services::{LossPlan, PipelineError, Stage, Warning};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Ten-byte stream, fragment size 4
// ══════════════════════════════════════════════════════════════════════════════

/// `[0..9]` at size 4 splits into `[0,1,2,3]`, `[4,5,6,7]`, `[8,9]`, with one
/// parity over the first pair and the last fragment left unpaired.
#[tokio::test]
async fn test_ten_bytes_shape() {
    let frags = fragment(&ten_bytes(), 4).unwrap();
    assert_eq!(frags[0].as_slice(), &[0, 1, 2, 3]);
    assert_eq!(frags[1].as_slice(), &[4, 5, 6, 7]);
    assert_eq!(frags[2].as_slice(), &[8, 9]);

    let parity = compute_parity(&frags[0], &frags[1]).unwrap();
    assert_eq!(parity.bytes().as_ref(), &[4, 4, 4, 4]);

    let report = passthrough(4).run(ten_bytes(), &LossPlan::none()).await;
    assert!(report.is_completed());
    assert_eq!(report.stats.fragment_count, 3);
    assert_eq!(report.stats.parity_count, 1);
    assert_eq!(report.stats.unpaired_fragment, Some(2));
    assert!(report
        .stats
        .warnings
        .contains(&Warning::UnpairedFragment { index: 2, len: 2 }));
}

/// Losing fragment 0 is repaired exactly from fragment 1 and the parity.
#[tokio::test]
async fn test_single_loss_recovered() {
    let report = passthrough(4)
        .run(ten_bytes(), &LossPlan::lose_fragments([0]))
        .await;

    assert!(report.is_completed());
    assert_eq!(report.output.as_deref(), Some(&ten_bytes()[..]));
    assert_eq!(report.stats.checksum.transmitted, Some(45));
    assert_eq!(report.stats.checksum.reassembled, Some(45));
    assert_eq!(report.stats.checksum.matched, Some(true));
}

/// Losing both members of a pair is reported, not panicked on, and the stats
/// are complete up to reassembly.
#[tokio::test]
async fn test_pair_loss_reports_failure() {
    let report = passthrough(4)
        .run(ten_bytes(), &LossPlan::lose_fragments([0, 1]))
        .await;

    let (stage, error) = failure(&report);
    assert_eq!(stage, Stage::Reassemble);
    assert!(matches!(error, PipelineError::UnrecoverableLoss { indices } if indices == &vec![0, 1]));

    let s = &report.stats;
    assert_eq!(s.original_size, 10);
    assert_eq!(s.compressed_size, 10);
    assert_eq!(s.fragment_count, 3);
    assert_eq!(s.transmission.lost_fragments, vec![0, 1]);
    assert_eq!(s.recovery_attempts, 2);
    assert_eq!(s.recovered, 0);
    assert_eq!(s.checksum.transmitted, Some(45));
    assert_eq!(s.checksum.matched, None);
    assert!(report.output.is_none());
}

// ══════════════════════════════════════════════════════════════════════════════
//  Edge cases
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unpaired_tail_is_unprotected() {
    let report = passthrough(4)
        .run(ten_bytes(), &LossPlan::lose_fragments([2]))
        .await;
    let (_, error) = failure(&report);
    assert!(matches!(error, PipelineError::UnrecoverableLoss { .. }));
    assert_eq!(
        report.stats.recoveries[0].outcome,
        RecoveryOutcome::Unrecoverable {
            cause: LossCause::Unprotected
        }
    );
}

/// Size 6 over 10 bytes leaves a 6/4 pair: the parity covers 4 bytes, so the
/// 4-byte member is recoverable and the 6-byte one is not.
#[tokio::test]
async fn test_partial_coverage() {
    let pipeline = passthrough(6);

    let ok = pipeline.run(ten_bytes(), &LossPlan::lose_fragments([1])).await;
    assert!(ok.is_completed());
    assert!(matches!(
        ok.stats.warnings.as_slice(),
        [Warning::PartialCoverageParity { covered: 4, .. }]
    ));

    let bad = pipeline.run(ten_bytes(), &LossPlan::lose_fragments([0])).await;
    let (_, error) = failure(&bad);
    assert!(matches!(
        error,
        PipelineError::IncompleteRecovery {
            index: 0,
            expected: 6,
            covered: 4
        }
    ));
}

#[tokio::test]
async fn test_parity_loss() {
    let pipeline = passthrough(4);

    let alone = pipeline
        .run(ten_bytes(), &LossPlan::none().with_lost_parities([0]))
        .await;
    assert!(alone.is_completed());

    let with_member = pipeline
        .run(
            ten_bytes(),
            &LossPlan::lose_fragments([0]).with_lost_parities([0]),
        )
        .await;
    assert!(matches!(
        failure(&with_member).1,
        PipelineError::UnrecoverableLoss { .. }
    ));
}

#[tokio::test]
async fn test_corruption_is_caught_by_checksum() {
    let report = passthrough(4)
        .run(ten_bytes(), &LossPlan::none().with_corrupted([2]))
        .await;
    let (stage, error) = failure(&report);
    assert_eq!(stage, Stage::ChecksumVerify);
    assert!(matches!(error, PipelineError::ChecksumMismatch { .. }));
}

/// A corrupted LZ4 stream may fail to decode at all; it still surfaces as a
/// checksum mismatch rather than a codec error.
#[tokio::test]
async fn test_corrupted_lz4_stream_reports_checksum() {
    let input = telemetry::generate(500, 3);
    let report = lz4(512).run(input, &LossPlan::none().with_corrupted([0])).await;
    let (stage, error) = failure(&report);
    assert_eq!(stage, Stage::ChecksumVerify);
    assert_eq!(error.kind(), "checksum_mismatch");
}

// ══════════════════════════════════════════════════════════════════════════════
//  LZ4 on telemetry
// ══════════════════════════════════════════════════════════════════════════════

/// One loss in each of several distinct pairs: every loss is repaired and the
/// output matches the input byte for byte.
#[tokio::test]
async fn test_lz4_telemetry_with_spread_losses() {
    let input = telemetry::generate(5_000, 1);
    let pipeline = lz4(1024);

    let report = pipeline
        .run(input.clone(), &LossPlan::lose_fragments([0, 3, 4, 7, 9]))
        .await;

    assert!(report.is_completed(), "{:?}", report.terminal);
    assert_eq!(report.output.as_deref(), Some(&input[..]));
    assert_eq!(report.stats.codec, "lz4");
    assert_eq!(report.stats.recovered, 5);
    assert!(report.stats.compression_ratio_pct < 100.0);
    assert!(report.stats.fragment_count > 10);
    assert_eq!(
        report.manifest.as_ref().map(|m| m.original_len),
        Some(input.len() as u64)
    );
}

/// Identical input yields the identical stream id and checksums run after run.
#[tokio::test]
async fn test_runs_are_deterministic() {
    let input = telemetry::generate(1_000, 5);
    let pipeline = lz4(2048);
    let a = pipeline.run(input.clone(), &LossPlan::none()).await;
    let b = pipeline.run(input, &LossPlan::none()).await;
    assert_eq!(a.stats.stream_id, b.stats.stream_id);
    assert_eq!(a.stats.checksum.transmitted, b.stats.checksum.transmitted);
    assert_eq!(a.manifest, b.manifest);
}
