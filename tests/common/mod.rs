#![allow(dead_code)]

use anyhow::{Result, anyhow};
use image::{Rgba, RgbaImage};
use pagecap::{
    config::Config,
    document::DocumentBuilder,
    error::JobError,
    progress::ProgressReporter,
    raster::{RasterOptions, Rasterizer, SurfaceRasterizer},
    viewer::{Surface, Unit, Viewer},
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default timings, unscaled rasters so fake gray levels survive capture.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.capture.scale = 1.0;
    cfg
}

pub fn gray(width: u32, height: u32, level: u8) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([level, level, level, 255]))
}

pub fn white(width: u32, height: u32) -> RgbaImage {
    gray(width, height, 255)
}

#[derive(Debug, Clone)]
pub enum FakePage {
    /// Paints content as soon as it is scrolled to.
    Renders,
    /// Surface exists at full size but stays white forever.
    NeverPaints,
    /// No surface at all.
    Missing,
}

/// Level painted for unit `i`, so placed images identify their unit.
pub fn level_for(index: usize) -> u8 {
    40 + index as u8
}

pub struct FakeViewer {
    pub pages: Vec<FakePage>,
    pub scrolled: Vec<usize>,
    pub visited: Vec<bool>,
    pub locate_fails: bool,
    pub title: Option<String>,
}

impl FakeViewer {
    pub fn new(pages: Vec<FakePage>) -> Self {
        let visited = vec![false; pages.len()];
        Self {
            pages,
            scrolled: Vec::new(),
            visited,
            locate_fails: false,
            title: Some("Fake document".into()),
        }
    }

    pub fn rendering(n: usize) -> Self {
        Self::new(vec![FakePage::Renders; n])
    }
}

impl Viewer for FakeViewer {
    async fn locate(&mut self) -> Result<(), JobError> {
        if self.locate_fails {
            return Err(JobError::SurfaceNotFound("no .pdfViewer".into()));
        }
        Ok(())
    }

    fn units(&self) -> Vec<Unit> {
        (0..self.pages.len()).map(|index| Unit { index }).collect()
    }

    async fn scroll_into_view(&mut self, unit: Unit) {
        self.scrolled.push(unit.index);
        self.visited[unit.index] = true;
    }

    fn surface(&self, unit: Unit) -> Option<Surface> {
        match self.pages.get(unit.index)? {
            FakePage::Renders if self.visited[unit.index] => {
                Some(Surface::painted(gray(120, 160, level_for(unit.index))))
            }
            FakePage::Renders => None,
            FakePage::NeverPaints => Some(Surface::painted(white(120, 160))),
            FakePage::Missing => None,
        }
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Pass,
    Blank,
    Fail(&'static str),
}

/// Delegates to [`SurfaceRasterizer`] unless the script says otherwise.
pub struct ScriptedRasterizer {
    pub script: VecDeque<Step>,
    pub calls: usize,
    inner: SurfaceRasterizer,
}

impl ScriptedRasterizer {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
            inner: SurfaceRasterizer,
        }
    }

    pub fn passing() -> Self {
        Self::new(vec![])
    }
}

impl Rasterizer for ScriptedRasterizer {
    async fn rasterize(&mut self, surface: &Surface, options: &RasterOptions) -> Result<RgbaImage> {
        self.calls += 1;
        match self.script.pop_front().unwrap_or(Step::Pass) {
            Step::Pass => self.inner.rasterize(surface, options).await,
            Step::Blank => Ok(white(surface.width, surface.height)),
            Step::Fail(msg) => Err(anyhow!(msg)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Break,
    Image(u8),
}

#[derive(Debug, Default)]
pub struct RecordingBuilder {
    pub ops: Vec<Op>,
    pub fail_place: bool,
}

impl RecordingBuilder {
    /// Per page, the level of the image placed on it (if any).
    pub fn pages(&self) -> Vec<Option<u8>> {
        let mut pages = vec![None];
        for op in &self.ops {
            match op {
                Op::Break => pages.push(None),
                Op::Image(level) => {
                    if let Some(last) = pages.last_mut() {
                        *last = Some(*level);
                    }
                }
            }
        }
        pages
    }
}

impl DocumentBuilder for RecordingBuilder {
    fn page_break(&mut self) -> Result<()> {
        self.ops.push(Op::Break);
        Ok(())
    }

    fn place_image(&mut self, image: &RgbaImage) -> Result<()> {
        if self.fail_place {
            return Err(anyhow!("encoder exploded"));
        }
        self.ops.push(Op::Image(image.get_pixel(0, 0)[0]));
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages().len()
    }

    fn finish(self) -> Result<Vec<u8>> {
        Ok(format!("{:?}", self.pages()).into_bytes())
    }
}

#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<(String, u8)>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<(String, u8)> {
        self.events.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().into_iter().map(|(_, p)| p).collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, message: &str, percent: u8) {
        self.events.lock().unwrap().push((message.to_string(), percent));
    }
}
