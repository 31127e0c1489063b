use crate::{
    capture::CaptureEngine,
    config::Config,
    document::{DocumentBuilder, output_file_name},
    error::JobError,
    preload::preload,
    probe::ReadinessProber,
    progress::ProgressReporter,
    raster::{RasterOptions, Rasterizer},
    report::{JobReport, Tally},
    util::now_rfc3339,
    validate::ContentValidator,
    viewer::{Unit, Viewer},
};
use anyhow::{Context, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FOUND_PERCENT: u8 = 5;

/// One capture run. Owns the viewer, the rasterizer and the output builder
/// from the structural checks until the document is finalized; dropping it
/// early discards the builder.
pub struct Job<V, R, B> {
    cfg: Config,
    viewer: V,
    rasterizer: R,
    builder: B,
    units: Vec<Unit>,
    validator: ContentValidator,
    prober: ReadinessProber,
    options: RasterOptions,
}

pub struct JobOutput {
    pub file_name: String,
    pub document: Vec<u8>,
    pub report: JobReport,
}

impl<V, R, B> Job<V, R, B>
where
    V: Viewer,
    R: Rasterizer,
    B: DocumentBuilder,
{
    /// Locates the viewer and enumerates units. Fails with [`JobError`] when
    /// either precondition does not hold.
    pub async fn start(cfg: &Config, mut viewer: V, rasterizer: R, builder: B) -> Result<Self> {
        let options = RasterOptions::from_config(cfg)?;
        viewer.locate().await?;
        let units = viewer.units();
        if units.is_empty() {
            return Err(JobError::NoUnits.into());
        }
        info!("found {} pages", units.len());

        let validator = ContentValidator::from_config(cfg);
        let prober = ReadinessProber::new(cfg, validator.clone());
        Ok(Self {
            cfg: cfg.clone(),
            viewer,
            rasterizer,
            builder,
            units,
            validator,
            prober,
            options,
        })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn title(&self) -> Option<String> {
        self.viewer.title()
    }

    pub async fn run(mut self, progress: &dyn ProgressReporter) -> Result<JobOutput> {
        let started = now_rfc3339();
        let total = self.units.len();

        progress.report(&format!("found {total} pages, preloading"), FOUND_PERCENT);
        let preload = preload(
            &self.cfg,
            &mut self.viewer,
            &self.units,
            &self.prober,
            progress,
        )
        .await;

        let engine = CaptureEngine::new(&self.cfg, &self.prober, &self.validator, &self.options);
        debug!("worst case per page: {:?}", engine.worst_case());
        let pages = engine
            .run(
                &mut self.viewer,
                &mut self.rasterizer,
                &mut self.builder,
                &self.units,
                progress,
            )
            .await?;

        let title = self.viewer.title();
        let file_name = output_file_name(&self.cfg, title.as_deref())?;
        let document = self.builder.finish().with_context(|| "finalizing output document")?;

        let tally = Tally::from_pages(&pages);
        info!("capture finished: {tally} pages captured");
        progress.report(&format!("done: {tally} pages captured"), 100);

        Ok(JobOutput {
            file_name: file_name.clone(),
            document,
            report: JobReport {
                job_name: self.cfg.global.job_name.clone(),
                started,
                finished: now_rfc3339(),
                title,
                file_name,
                tally,
                preload,
                pages,
            },
        })
    }
}

/// Gate that lets exactly one job run at a time against an output root.
///
/// Held as a lock file, so it also turns away a second process pointed at
/// the same directory. A lock left behind by a killed process has to be
/// removed by hand; its contents name the owning pid.
#[derive(Debug, Clone)]
pub struct Trigger {
    lock: PathBuf,
}

impl Trigger {
    pub const LOCK_FILE: &'static str = ".pagecap.lock";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            lock: dir.join(Self::LOCK_FILE),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    /// `Ok(None)` while another job holds the trigger.
    pub fn try_acquire(&self) -> Result<Option<TriggerGuard>> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock);
        match file {
            Ok(mut f) => {
                let guard = TriggerGuard {
                    lock: self.lock.clone(),
                };
                writeln!(f, "{}", std::process::id())
                    .with_context(|| format!("writing lock: {}", self.lock.display()))?;
                Ok(Some(guard))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e).with_context(|| format!("creating lock: {}", self.lock.display())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.lock.exists()
    }
}

/// Re-enables the trigger when dropped, however the job ended.
#[derive(Debug)]
pub struct TriggerGuard {
    lock: PathBuf,
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.lock) {
            warn!("could not release {}: {err}", self.lock.display());
        }
    }
}
