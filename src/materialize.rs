use crate::viewer::{Unit, Viewer};
use std::time::Duration;
use tracing::trace;

/// Scrolls `unit` into view and gives the renderer `settle` to start.
///
/// Scrolling only triggers rendering indirectly, so a fixed delay is all
/// there is to wait on here; readiness is checked separately.
pub async fn materialize<V: Viewer>(viewer: &mut V, unit: Unit, settle: Duration) {
    trace!("materialize unit {}", unit.index);
    viewer.scroll_into_view(unit).await;
    tokio::time::sleep(settle).await;
}
