//! Bulk warm-up before capture: one sweep over every unit, then a bounded
//! number of reconciliation rounds over whatever is still not ready.
//!
//! Readiness here is best effort. Units left pending are handed to capture
//! anyway, where retries are the real backstop.

use crate::{
    config::Config,
    materialize::materialize,
    probe::ReadinessProber,
    progress::ProgressReporter,
    util::millis,
    viewer::{Unit, Viewer},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreloadSummary {
    pub swept: usize,
    pub reconcile_rounds: u32,
    /// Indices still not ready when preload gave up.
    pub pending: Vec<usize>,
}

pub const SWEEP_START: u8 = 10;
pub const SWEEP_SPAN: u8 = 30;
pub const RECONCILE_START: u8 = 40;
pub const RECONCILE_STEP: u8 = 5;
pub const PRELOAD_CEILING: u8 = 50;

pub async fn preload<V: Viewer>(
    cfg: &Config,
    viewer: &mut V,
    units: &[Unit],
    prober: &ReadinessProber,
    progress: &dyn ProgressReporter,
) -> PreloadSummary {
    let total = units.len();
    let mut summary = PreloadSummary::default();

    for (i, unit) in units.iter().enumerate() {
        materialize(viewer, *unit, millis(cfg.materialize.settle_ms)).await;
        tokio::time::sleep(millis(cfg.preload.sweep_settle_ms)).await;
        summary.swept += 1;
        progress.report(
            &format!("preloading page {}/{}", i + 1, total),
            sweep_percent(i, total),
        );
    }

    progress.report("waiting for pages to finish rendering", RECONCILE_START);
    tokio::time::sleep(millis(cfg.preload.global_settle_ms)).await;

    let rounds = cfg.preload.reconcile_rounds;
    for round in 0..rounds {
        let pending = prober.pending(viewer, units);
        if pending.is_empty() {
            break;
        }
        summary.reconcile_rounds += 1;
        info!(
            "reconcile round {}/{}: {} pages not ready",
            round + 1,
            rounds,
            pending.len()
        );
        progress.report(
            &format!(
                "retrying {} unfinished pages ({}/{})",
                pending.len(),
                round + 1,
                rounds
            ),
            reconcile_percent(round),
        );
        for unit in pending {
            materialize(viewer, unit, millis(cfg.materialize.settle_ms)).await;
            tokio::time::sleep(millis(cfg.preload.reconcile_unit_settle_ms)).await;
        }
        tokio::time::sleep(millis(cfg.preload.reconcile_settle_ms)).await;
    }

    summary.pending = prober
        .pending(viewer, units)
        .into_iter()
        .map(|u| u.index)
        .collect();
    if !summary.pending.is_empty() {
        warn!(
            "preload finished with {} pages not ready: {:?}",
            summary.pending.len(),
            summary.pending
        );
    }
    summary
}

fn sweep_percent(i: usize, total: usize) -> u8 {
    SWEEP_START + (i * usize::from(SWEEP_SPAN) / total.max(1)) as u8
}

fn reconcile_percent(round: u32) -> u8 {
    let step = u32::from(RECONCILE_STEP) * round;
    (u32::from(RECONCILE_START) + step).min(u32::from(PRELOAD_CEILING)) as u8
}
