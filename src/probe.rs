use crate::{
    config::Config,
    validate::ContentValidator,
    viewer::{Unit, Viewer},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Answers "has this unit finished rendering?" from the surface alone.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    min_width: u32,
    min_height: u32,
    poll_interval: Duration,
    validator: ContentValidator,
}

impl ReadinessProber {
    pub fn new(cfg: &Config, validator: ContentValidator) -> Self {
        Self {
            min_width: cfg.readiness.min_width,
            min_height: cfg.readiness.min_height,
            poll_interval: Duration::from_millis(cfg.readiness.poll_interval_ms.max(1)),
            validator,
        }
    }

    /// A surface of the right size can still be an unpainted frame, so the
    /// pixels have to pass validation too.
    pub fn is_ready<V: Viewer>(&self, viewer: &V, unit: Unit) -> bool {
        match viewer.surface(unit) {
            None => false,
            Some(s) => {
                s.width >= self.min_width
                    && s.height >= self.min_height
                    && self.validator.is_contentful(&s)
            }
        }
    }

    /// Polls until ready or `timeout` elapses. Never fails.
    pub async fn wait_until_ready<V: Viewer>(
        &self,
        viewer: &V,
        unit: Unit,
        timeout: Duration,
    ) -> Readiness {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready(viewer, unit) {
                return Readiness::Ready;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("unit {} not ready after {:?}", unit.index, timeout);
                return Readiness::TimedOut;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Units not ready right now, in index order.
    pub fn pending<V: Viewer>(&self, viewer: &V, units: &[Unit]) -> Vec<Unit> {
        units
            .iter()
            .copied()
            .filter(|u| !self.is_ready(viewer, *u))
            .collect()
    }
}
