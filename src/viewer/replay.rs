//! Offline viewer over a directory of pre-rendered page images.
//!
//! It behaves like a virtualized document viewer: scrolling to a page starts
//! painting the pages around it, painting finishes after a fixed latency, and
//! pages that fall outside the window are evicted again.

use super::{Surface, Unit, Viewer};
use crate::{config::Config, error::JobError};
use image::{Rgba, RgbaImage};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const PAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ReplayViewer {
    dir: PathBuf,
    title: Option<String>,
    latency: Duration,
    window: usize,
    locate_timeout: Duration,
    locate_poll: Duration,
    unpainted: Arc<RgbaImage>,
    frames: Vec<Frame>,
    paint: Vec<Paint>,
    focus: Option<usize>,
}

struct Frame {
    width: u32,
    height: u32,
    image: Option<Arc<RgbaImage>>,
}

#[derive(Debug, Clone, Copy)]
enum Paint {
    Evicted,
    Scheduled(Instant),
}

impl ReplayViewer {
    pub fn new(dir: &Path, cfg: &Config) -> Self {
        let title = if cfg.replay.title.trim().is_empty() {
            dir.file_name().map(|s| s.to_string_lossy().into_owned())
        } else {
            Some(cfg.replay.title.clone())
        };
        Self {
            dir: dir.to_path_buf(),
            title,
            latency: Duration::from_millis(cfg.replay.render_latency_ms),
            window: cfg.replay.window,
            locate_timeout: Duration::from_millis(cfg.replay.locate_timeout_ms),
            locate_poll: Duration::from_millis(cfg.readiness.poll_interval_ms.max(1)),
            unpainted: Arc::new(RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]))),
            frames: Vec::new(),
            paint: Vec::new(),
            focus: None,
        }
    }

    fn page_files(&self) -> Result<Vec<PathBuf>, JobError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| JobError::SurfaceNotFound(format!("{}: {e}", self.dir.display())))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_page_file(p))
            .collect();
        files.sort_by(|a, b| natural_cmp(&file_key(a), &file_key(b)));
        Ok(files)
    }

    /// Waits up to the locate timeout for the page directory to show up.
    async fn wait_for_dir(&self) -> bool {
        let deadline = Instant::now() + self.locate_timeout;
        loop {
            if self.dir.is_dir() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.locate_poll.min(deadline - now)).await;
        }
    }
}

fn file_key(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Orders names with digit runs compared by value: `page_2` < `page_10`.
/// Falls back to plain text order on ties such as `7` vs `007`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut x, mut y) = (a, b);
    loop {
        match (x.chars().next(), y.chars().next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c), Some(d)) if c.is_ascii_digit() && d.is_ascii_digit() => {
                let (dx, rx) = split_digits(x);
                let (dy, ry) = split_digits(y);
                let (tx, ty) = (dx.trim_start_matches('0'), dy.trim_start_matches('0'));
                let ord = tx.len().cmp(&ty.len()).then_with(|| tx.cmp(ty));
                if ord != Ordering::Equal {
                    return ord;
                }
                (x, y) = (rx, ry);
            }
            (Some(c), Some(d)) => {
                if c != d {
                    return c.cmp(&d);
                }
                (x, y) = (&x[c.len_utf8()..], &y[d.len_utf8()..]);
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn is_page_file(p: &Path) -> bool {
    p.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            PAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn load_frame(path: &Path) -> Frame {
    match image::open(path) {
        Ok(img) => {
            let img = img.to_rgba8();
            Frame {
                width: img.width(),
                height: img.height(),
                image: Some(Arc::new(img)),
            }
        }
        Err(err) => {
            // The page still occupies its slot; it just never paints readable pixels.
            warn!("unreadable page image {}: {err}", path.display());
            let (width, height) = image::image_dimensions(path).unwrap_or((0, 0));
            Frame {
                width,
                height,
                image: None,
            }
        }
    }
}

impl Viewer for ReplayViewer {
    async fn locate(&mut self) -> Result<(), JobError> {
        if !self.wait_for_dir().await {
            return Err(JobError::SurfaceNotFound(format!(
                "page directory did not appear within {:?}: {}",
                self.locate_timeout,
                self.dir.display()
            )));
        }
        let files = self.page_files()?;
        self.frames = files.iter().map(|p| load_frame(p)).collect();
        self.paint = vec![Paint::Evicted; self.frames.len()];
        self.focus = None;
        debug!("replay viewer located {} pages in {}", self.frames.len(), self.dir.display());
        Ok(())
    }

    fn units(&self) -> Vec<Unit> {
        (0..self.frames.len()).map(|index| Unit { index }).collect()
    }

    async fn scroll_into_view(&mut self, unit: Unit) {
        let now = Instant::now();
        self.focus = Some(unit.index);
        for (i, paint) in self.paint.iter_mut().enumerate() {
            if i.abs_diff(unit.index) <= self.window {
                if matches!(paint, Paint::Evicted) {
                    *paint = Paint::Scheduled(now + self.latency);
                }
            } else {
                *paint = Paint::Evicted;
            }
        }
    }

    fn surface(&self, unit: Unit) -> Option<Surface> {
        let frame = self.frames.get(unit.index)?;
        match self.paint.get(unit.index)? {
            Paint::Evicted => None,
            Paint::Scheduled(at) if Instant::now() < *at => Some(Surface {
                width: frame.width,
                height: frame.height,
                pixels: Some(Arc::clone(&self.unpainted)),
                concealed: false,
            }),
            Paint::Scheduled(_) => Some(Surface {
                width: frame.width,
                height: frame.height,
                pixels: frame.image.clone(),
                concealed: self.focus != Some(unit.index),
            }),
        }
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}
