mod common;

use common::{
    FakePage, FakeViewer, RecordingBuilder, RecordingProgress, ScriptedRasterizer, level_for,
    test_config,
};
use pagecap::{
    capture::OutcomeKind,
    document::PdfBuilder,
    error::JobError,
    job::{Job, Trigger},
    raster::SurfaceRasterizer,
    viewer::ReplayViewer,
};

#[tokio::test(start_paused = true)]
async fn missing_surface_aborts_before_any_page() {
    let cfg = test_config();
    let mut viewer = FakeViewer::rendering(3);
    viewer.locate_fails = true;

    let err = Job::start(&cfg, viewer, ScriptedRasterizer::passing(), RecordingBuilder::default())
        .await
        .err()
        .expect("structural failure");
    assert!(matches!(
        err.downcast_ref::<JobError>(),
        Some(JobError::SurfaceNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn zero_pages_aborts() {
    let cfg = test_config();
    let viewer = FakeViewer::new(vec![]);

    let err = Job::start(&cfg, viewer, ScriptedRasterizer::passing(), RecordingBuilder::default())
        .await
        .err()
        .expect("structural failure");
    assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::NoUnits)));
}

#[tokio::test(start_paused = true)]
async fn one_bad_page_yields_partial_tally() {
    let cfg = test_config();
    let viewer = FakeViewer::new(vec![
        FakePage::Renders,
        FakePage::NeverPaints,
        FakePage::Renders,
    ]);
    let job = Job::start(&cfg, viewer, ScriptedRasterizer::passing(), RecordingBuilder::default())
        .await
        .unwrap();
    assert_eq!(job.units().len(), 3);

    let progress = RecordingProgress::default();
    let output = job.run(&progress).await.unwrap();

    let expected = format!("{:?}", vec![Some(level_for(0)), None, Some(level_for(2))]);
    assert_eq!(String::from_utf8(output.document).unwrap(), expected);

    let report = output.report;
    assert_eq!(report.tally.to_string(), "2/3");
    assert!(!report.tally.is_complete());
    assert_eq!(report.pages.len(), 3);
    assert_eq!(report.pages[1].outcome, OutcomeKind::Placeholder);
    assert!(report.pages.iter().all(|p| p.attempts <= 3));
    assert_eq!(output.file_name, "Fake document.pdf");

    let events = progress.events();
    assert_eq!(events.first().map(|e| e.1), Some(5));
    assert_eq!(
        events.last().cloned(),
        Some(("done: 2/3 pages captured".to_string(), 100))
    );
}

#[tokio::test(start_paused = true)]
async fn replay_directory_to_pdf() {
    let dir = tempfile::tempdir().unwrap();
    common::gray(150, 200, 30)
        .save(dir.path().join("page_001.png"))
        .unwrap();
    common::white(150, 200)
        .save(dir.path().join("page_002.png"))
        .unwrap();
    common::gray(150, 200, 90)
        .save(dir.path().join("page_003.png"))
        .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a page").unwrap();

    let mut cfg = test_config();
    cfg.replay.title = "Tender / Notice: 2024".into();

    let viewer = ReplayViewer::new(dir.path(), &cfg);
    let job = Job::start(&cfg, viewer, SurfaceRasterizer, PdfBuilder::new(&cfg))
        .await
        .unwrap();
    assert_eq!(job.title().as_deref(), Some("Tender / Notice: 2024"));

    let progress = RecordingProgress::default();
    let output = job.run(&progress).await.unwrap();

    assert_eq!(output.file_name, "Tender Notice 2024.pdf");
    assert_eq!(output.report.tally.to_string(), "2/3");
    let doc = lopdf::Document::load_mem(&output.document).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn replay_missing_directory_is_structural() {
    let cfg = test_config();
    let viewer = ReplayViewer::new(std::path::Path::new("/definitely/not/here"), &cfg);
    let err = Job::start(&cfg, viewer, SurfaceRasterizer, PdfBuilder::new(&cfg))
        .await
        .err()
        .expect("structural failure");
    assert!(matches!(
        err.downcast_ref::<JobError>(),
        Some(JobError::SurfaceNotFound(_))
    ));
}

#[test]
fn trigger_admits_one_job_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let trigger = Trigger::in_dir(dir.path());
    assert!(trigger.is_enabled());
    {
        let _guard = trigger.try_acquire().unwrap().expect("idle trigger");
        assert!(!trigger.is_enabled());
        assert!(trigger.try_acquire().unwrap().is_none());

        // A second gate over the same directory, as another process would hold.
        let other = Trigger::in_dir(dir.path());
        assert!(other.try_acquire().unwrap().is_none());
    }
    assert!(trigger.is_enabled());
    assert!(!dir.path().join(Trigger::LOCK_FILE).exists());
    assert!(trigger.try_acquire().unwrap().is_some());
}

#[test]
fn stale_lock_keeps_the_trigger_disabled() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(Trigger::LOCK_FILE), "4242\n").unwrap();

    let trigger = Trigger::in_dir(dir.path());
    assert!(!trigger.is_enabled());
    assert!(trigger.try_acquire().unwrap().is_none());
}

#[test]
fn trigger_in_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let trigger = Trigger::in_dir(&dir.path().join("absent"));
    assert!(trigger.try_acquire().is_err());
}
