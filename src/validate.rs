use crate::{config::Config, viewer::Surface};
use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("pixel data cannot be read back: {0}")]
pub struct PixelReadError(pub String);

/// Anything whose RGBA buffer can be read back for validation.
pub trait PixelSource {
    fn rgba(&self) -> Result<&[u8], PixelReadError>;
}

impl PixelSource for RgbaImage {
    fn rgba(&self) -> Result<&[u8], PixelReadError> {
        Ok(self.as_raw())
    }
}

impl PixelSource for Surface {
    fn rgba(&self) -> Result<&[u8], PixelReadError> {
        self.pixels
            .as_ref()
            .map(|img| img.as_raw().as_slice())
            .ok_or_else(|| PixelReadError("surface is tainted".into()))
    }
}

/// Decides "contentful" vs "blank" from evenly strided pixel samples.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    sample_count: usize,
    white_cutoff: u8,
    min_nonblank_ratio: f64,
}

impl ContentValidator {
    pub fn new(sample_count: usize, white_cutoff: u8, min_nonblank_ratio: f64) -> Self {
        Self {
            sample_count: sample_count.max(1),
            white_cutoff,
            min_nonblank_ratio,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.validation.sample_count,
            cfg.validation.white_cutoff,
            cfg.validation.min_nonblank_ratio,
        )
    }

    /// Unreadable pixel data counts as blank.
    pub fn is_contentful(&self, source: &dyn PixelSource) -> bool {
        let data = match source.rgba() {
            Ok(data) => data,
            Err(err) => {
                debug!("validator: {err}");
                return false;
            }
        };

        let pixels = data.len() / 4;
        if pixels == 0 {
            return false;
        }
        // Samples spread over the whole buffer, last rows included.
        let sampled = self.sample_count.min(pixels);
        let nonblank = (0..sampled)
            .map(|k| k * pixels / sampled * 4)
            .filter(|&i| data[i..i + 3].iter().any(|&c| c < self.white_cutoff))
            .count();

        let threshold = sampled as f64 * self.min_nonblank_ratio;
        nonblank as f64 > threshold
    }
}
