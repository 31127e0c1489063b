//! Capture-and-assemble: one unit at a time, in index order, each ending in
//! exactly one page of the output document.
//!
//! A unit gets at most `max_attempts` rasterizations. Blank results retry
//! after a longer settle delay; rasterizer errors additionally back off
//! linearly. When attempts run out the unit becomes an empty placeholder
//! page, so later pages never shift.

use crate::{
    config::Config,
    document::DocumentBuilder,
    materialize::materialize,
    probe::{Readiness, ReadinessProber},
    progress::ProgressReporter,
    raster::{RasterOptions, Rasterizer},
    util::millis,
    validate::ContentValidator,
    viewer::{Unit, Viewer},
};
use anyhow::{Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const CAPTURE_START: u8 = 10;
pub const CAPTURE_SPAN: u8 = 80;

/// Outcome of a single rasterization attempt.
#[derive(Debug)]
pub enum CaptureResult {
    Success(RgbaImage),
    Blank,
    Error(String),
}

/// Final outcome for one unit.
#[derive(Debug)]
pub enum PageOutcome {
    Captured(RgbaImage),
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Captured,
    Placeholder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub index: usize,
    pub outcome: OutcomeKind,
    pub attempts: u32,
    pub readiness: Readiness,
    #[serde(default)]
    pub last_failure: Option<String>,
}

pub struct UnitCapture {
    pub outcome: PageOutcome,
    pub attempts: u32,
    pub readiness: Readiness,
    pub last_failure: Option<String>,
}

pub struct CaptureEngine<'a> {
    cfg: &'a Config,
    prober: &'a ReadinessProber,
    validator: &'a ContentValidator,
    options: &'a RasterOptions,
}

impl<'a> CaptureEngine<'a> {
    pub fn new(
        cfg: &'a Config,
        prober: &'a ReadinessProber,
        validator: &'a ContentValidator,
        options: &'a RasterOptions,
    ) -> Self {
        Self {
            cfg,
            prober,
            validator,
            options,
        }
    }

    /// Capture every unit in order, streaming each outcome into `builder`.
    ///
    /// Only builder page-break failures are returned; anything that goes
    /// wrong with a single unit ends up as a placeholder page.
    pub async fn run<V, R, B>(
        &self,
        viewer: &mut V,
        rasterizer: &mut R,
        builder: &mut B,
        units: &[Unit],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<PageReport>>
    where
        V: Viewer,
        R: Rasterizer,
        B: DocumentBuilder,
    {
        let total = units.len();
        let mut reports = Vec::with_capacity(total);

        for (position, unit) in units.iter().enumerate() {
            let capture = self.capture_unit(viewer, rasterizer, *unit).await;
            if position > 0 {
                builder
                    .page_break()
                    .with_context(|| format!("opening page {}", unit.index + 1))?;
            }

            let mut last_failure = capture.last_failure;
            let outcome = match capture.outcome {
                PageOutcome::Captured(image) => match builder.place_image(&image) {
                    Ok(()) => OutcomeKind::Captured,
                    Err(err) => {
                        warn!("page {}: placing image failed, left empty: {err:#}", unit.index + 1);
                        last_failure = Some(format!("{err:#}"));
                        OutcomeKind::Placeholder
                    }
                },
                PageOutcome::Placeholder => OutcomeKind::Placeholder,
            };

            reports.push(PageReport {
                index: unit.index,
                outcome,
                attempts: capture.attempts,
                readiness: capture.readiness,
                last_failure,
            });

            progress.report(
                &format!("processed {}/{} pages", position + 1, total),
                capture_percent(position, total),
            );
        }

        Ok(reports)
    }

    pub async fn capture_unit<V, R>(&self, viewer: &mut V, rasterizer: &mut R, unit: Unit) -> UnitCapture
    where
        V: Viewer,
        R: Rasterizer,
    {
        let page = unit.index + 1;
        materialize(viewer, unit, millis(self.cfg.materialize.settle_ms)).await;
        let readiness = self
            .prober
            .wait_until_ready(viewer, unit, millis(self.cfg.readiness.ready_timeout_ms))
            .await;
        if readiness == Readiness::TimedOut {
            debug!("page {page}: not ready after timeout, capturing anyway");
        }

        let max_attempts = self.cfg.capture.max_attempts.max(1);
        let mut last_failure = None;

        for attempt in 0..max_attempts {
            let last = attempt + 1 == max_attempts;
            tokio::time::sleep(self.cfg.capture.settle_for(attempt)).await;

            match self.attempt(viewer, rasterizer, unit).await {
                CaptureResult::Success(image) => {
                    debug!("page {page}: captured on attempt {}", attempt + 1);
                    return UnitCapture {
                        outcome: PageOutcome::Captured(image),
                        attempts: attempt + 1,
                        readiness,
                        last_failure,
                    };
                }
                CaptureResult::Blank => {
                    debug!("page {page}: attempt {}/{max_attempts} looked blank", attempt + 1);
                    last_failure = Some("capture looked blank".to_string());
                }
                CaptureResult::Error(reason) => {
                    warn!("page {page}: attempt {}/{max_attempts} failed: {reason}", attempt + 1);
                    last_failure = Some(reason);
                    if !last {
                        tokio::time::sleep(self.cfg.capture.backoff_for(attempt)).await;
                    }
                }
            }
        }

        warn!("page {page}: giving up after {max_attempts} attempts, inserting placeholder");
        UnitCapture {
            outcome: PageOutcome::Placeholder,
            attempts: max_attempts,
            readiness,
            last_failure,
        }
    }

    async fn attempt<V, R>(&self, viewer: &V, rasterizer: &mut R, unit: Unit) -> CaptureResult
    where
        V: Viewer,
        R: Rasterizer,
    {
        let Some(surface) = viewer.surface(unit) else {
            return CaptureResult::Error("no raster surface for page".to_string());
        };
        match rasterizer.rasterize(&surface, self.options).await {
            Ok(image) if self.validator.is_contentful(&image) => CaptureResult::Success(image),
            Ok(_) => CaptureResult::Blank,
            Err(err) => CaptureResult::Error(format!("{err:#}")),
        }
    }

    /// Upper bound on the time one unit can spend in capture.
    pub fn worst_case(&self) -> Duration {
        let c = &self.cfg.capture;
        let attempts = c.max_attempts.max(1);
        let settles: Duration = (0..attempts).map(|a| c.settle_for(a)).sum();
        let backoffs: Duration = (0..attempts - 1).map(|a| c.backoff_for(a)).sum();
        millis(self.cfg.materialize.settle_ms)
            + millis(self.cfg.readiness.ready_timeout_ms)
            + settles
            + backoffs
    }
}

pub fn capture_percent(position: usize, total: usize) -> u8 {
    CAPTURE_START + (position * usize::from(CAPTURE_SPAN) / total.max(1)) as u8
}
