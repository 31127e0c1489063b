pub mod replay;

use crate::error::JobError;
use image::RgbaImage;
use std::sync::Arc;

pub use replay::ReplayViewer;

/// One page of the source document. The index is stable for the lifetime of
/// a job and doubles as the handle the viewer resolves surfaces with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub index: usize,
}

/// Snapshot of a unit's raster surface as the viewer currently paints it.
#[derive(Debug, Clone)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    /// `None` when the pixels exist but cannot be read back (tainted).
    /// Shared with the viewer, so snapshots never copy the bitmap.
    pub pixels: Option<Arc<RgbaImage>>,
    /// The viewer's virtualization is hiding nested rasters right now.
    pub concealed: bool,
}

impl Surface {
    pub fn painted(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: Some(Arc::new(image)),
            concealed: false,
        }
    }
}

/// Host viewer that renders units lazily as they scroll into view.
///
/// Rendering completes asynchronously with no completion signal; callers
/// only observe it through [`Viewer::surface`].
#[allow(async_fn_in_trait)]
pub trait Viewer {
    /// Locate the paginated container. Fails when the viewer is not there.
    async fn locate(&mut self) -> Result<(), JobError>;
    /// Enumerate the units present right now, in page order.
    fn units(&self) -> Vec<Unit>;
    /// Smooth scroll that centers `unit` in the viewport.
    async fn scroll_into_view(&mut self, unit: Unit);
    /// Current raster surface of `unit`, if one exists.
    fn surface(&self, unit: Unit) -> Option<Surface>;
    /// Text of the page title element, if present.
    fn title(&self) -> Option<String>;
}
