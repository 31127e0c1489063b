use crate::{config::Config, viewer::Surface};
use anyhow::{Result, anyhow};
use image::{Rgb, RgbaImage, imageops::FilterType};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub use_cors: bool,
    pub allow_taint: bool,
    pub scale: f32,
    pub background: Rgb<u8>,
    /// Force nested rasters visible before capture.
    pub reveal_nested: bool,
}

impl RasterOptions {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            use_cors: cfg.capture.use_cors,
            allow_taint: cfg.capture.allow_taint,
            scale: cfg.capture.scale,
            background: cfg.capture.background_rgb()?,
            reveal_nested: cfg.capture.reveal_nested,
        })
    }
}

/// Turns a unit's surface into a raster image.
#[allow(async_fn_in_trait)]
pub trait Rasterizer {
    async fn rasterize(&mut self, surface: &Surface, options: &RasterOptions) -> Result<RgbaImage>;
}

/// Rasterizes surface snapshots in-process: resample by `scale`, then
/// flatten onto the background color.
#[derive(Debug, Default, Clone)]
pub struct SurfaceRasterizer;

impl Rasterizer for SurfaceRasterizer {
    async fn rasterize(&mut self, surface: &Surface, options: &RasterOptions) -> Result<RgbaImage> {
        debug!(
            use_cors = options.use_cors,
            allow_taint = options.allow_taint,
            scale = options.scale,
            "rasterize {}x{}",
            surface.width,
            surface.height
        );
        let (w, h) = scaled_dims(surface.width, surface.height, options.scale);
        if w == 0 || h == 0 {
            return Err(anyhow!("surface has no area: {}x{}", surface.width, surface.height));
        }

        let Some(pixels) = surface.pixels.as_ref() else {
            if options.allow_taint {
                return Err(anyhow!("tainted surface produced an unreadable raster"));
            }
            return Err(anyhow!("surface is tainted and allow_taint=false"));
        };

        if surface.concealed && !options.reveal_nested {
            debug!("surface concealed by viewer; rasterizing background only");
            return Ok(solid(w, h, options.background));
        }

        let scaled = if (w, h) == pixels.dimensions() {
            RgbaImage::clone(pixels)
        } else {
            image::imageops::resize(pixels.as_ref(), w, h, FilterType::Triangle)
        };
        Ok(flatten(scaled, options.background))
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let s = |v: u32| (v as f32 * scale).round().max(0.0) as u32;
    (s(width), s(height))
}

fn solid(w: u32, h: u32, bg: Rgb<u8>) -> RgbaImage {
    RgbaImage::from_pixel(w, h, image::Rgba([bg[0], bg[1], bg[2], 255]))
}

fn flatten(mut img: RgbaImage, bg: Rgb<u8>) -> RgbaImage {
    for px in img.pixels_mut() {
        let a = u32::from(px[3]);
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            let fg = u32::from(px[c]);
            let back = u32::from(bg[c]);
            px[c] = ((fg * a + back * (255 - a) + 127) / 255) as u8;
        }
        px[3] = 255;
    }
    img
}
