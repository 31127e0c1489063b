mod common;

use common::{FakePage, FakeViewer, RecordingProgress, test_config};
use pagecap::{
    preload::preload, probe::ReadinessProber, validate::ContentValidator, viewer::Viewer,
};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn ready_pages_skip_reconciliation() {
    let cfg = test_config();
    let prober = ReadinessProber::new(&cfg, ContentValidator::from_config(&cfg));
    let mut viewer = FakeViewer::rendering(4);
    let units = viewer.units();
    let progress = RecordingProgress::default();

    let summary = preload(&cfg, &mut viewer, &units, &prober, &progress).await;

    assert_eq!(summary.swept, 4);
    assert_eq!(summary.reconcile_rounds, 0);
    assert!(summary.pending.is_empty());
    assert_eq!(viewer.scrolled, vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn reconciliation_revisits_only_pending_pages() {
    let cfg = test_config();
    let prober = ReadinessProber::new(&cfg, ContentValidator::from_config(&cfg));
    let mut viewer = FakeViewer::new(vec![
        FakePage::Renders,
        FakePage::NeverPaints,
        FakePage::Renders,
    ]);
    let units = viewer.units();
    let progress = RecordingProgress::default();

    let summary = preload(&cfg, &mut viewer, &units, &prober, &progress).await;

    assert_eq!(summary.reconcile_rounds, 3);
    assert_eq!(summary.pending, vec![1]);
    assert_eq!(viewer.scrolled, vec![0, 1, 2, 1, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn never_ready_still_finishes_in_bounded_time() {
    let cfg = test_config();
    let prober = ReadinessProber::new(&cfg, ContentValidator::from_config(&cfg));
    let n = 5;
    let mut viewer = FakeViewer::new(vec![FakePage::NeverPaints; n]);
    let units = viewer.units();
    let progress = RecordingProgress::default();

    let started = Instant::now();
    let summary = preload(&cfg, &mut viewer, &units, &prober, &progress).await;
    let elapsed = started.elapsed();

    assert_eq!(summary.reconcile_rounds, cfg.preload.reconcile_rounds);
    assert_eq!(summary.pending.len(), n);

    let p = &cfg.preload;
    let settle = cfg.materialize.settle_ms;
    let sweep = n as u64 * (settle + p.sweep_settle_ms);
    let round = n as u64 * (settle + p.reconcile_unit_settle_ms) + p.reconcile_settle_ms;
    let bound = sweep + p.global_settle_ms + u64::from(p.reconcile_rounds) * round;
    assert!(elapsed >= Duration::from_millis(bound));
    assert!(elapsed < Duration::from_millis(bound + 50));
}

#[tokio::test(start_paused = true)]
async fn preload_progress_stays_within_its_band() {
    let cfg = test_config();
    let prober = ReadinessProber::new(&cfg, ContentValidator::from_config(&cfg));
    let mut viewer = FakeViewer::new(vec![FakePage::NeverPaints; 3]);
    let units = viewer.units();
    let progress = RecordingProgress::default();

    preload(&cfg, &mut viewer, &units, &prober, &progress).await;

    let percents = progress.percents();
    assert!(!percents.is_empty());
    assert!(percents.iter().all(|p| (10..=50).contains(p)));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}
