use anyhow::{Context, Result, anyhow};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub readiness: Readiness,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub materialize: Materialize,
    #[serde(default)]
    pub preload: Preload,
    #[serde(default)]
    pub capture: Capture,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub replay: Replay,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.max_attempts == 0 {
            return Err(anyhow!("capture.max_attempts must be at least 1"));
        }
        if !(self.capture.scale > 0.0) {
            return Err(anyhow!("capture.scale must be positive: {}", self.capture.scale));
        }
        self.capture.background_rgb()?;
        if self.validation.sample_count == 0 {
            return Err(anyhow!("validation.sample_count must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.validation.min_nonblank_ratio) {
            return Err(anyhow!(
                "validation.min_nonblank_ratio must be in [0, 1): {}",
                self.validation.min_nonblank_ratio
            ));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(anyhow!(
                "output.jpeg_quality must be in 1..=100: {}",
                self.output.jpeg_quality
            ));
        }
        if !(self.output.page_width_mm > 0.0) || !(self.output.placeholder_height_mm > 0.0) {
            return Err(anyhow!("output page dimensions must be positive"));
        }
        if self.output.default_file_name.trim().is_empty() {
            return Err(anyhow!("output.default_file_name must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub min_width: u32,
    pub min_height: u32,
    pub poll_interval_ms: u64,
    pub ready_timeout_ms: u64,
}
impl Default for Readiness {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 100,
            poll_interval_ms: 200,
            ready_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub sample_count: usize,
    pub white_cutoff: u8,
    pub min_nonblank_ratio: f64,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            sample_count: 1000,
            white_cutoff: 250,
            min_nonblank_ratio: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Materialize {
    pub settle_ms: u64,
}
impl Default for Materialize {
    fn default() -> Self {
        Self { settle_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preload {
    pub sweep_settle_ms: u64,
    pub global_settle_ms: u64,
    pub reconcile_rounds: u32,
    pub reconcile_unit_settle_ms: u64,
    pub reconcile_settle_ms: u64,
}
impl Default for Preload {
    fn default() -> Self {
        Self {
            sweep_settle_ms: 800,
            global_settle_ms: 3000,
            reconcile_rounds: 3,
            reconcile_unit_settle_ms: 1000,
            reconcile_settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub max_attempts: u32,
    pub settle_base_ms: u64,
    pub settle_step_ms: u64,
    pub error_backoff_ms: u64,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub scale: f32,
    pub background: String,
    pub reveal_nested: bool,
}
impl Default for Capture {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle_base_ms: 500,
            settle_step_ms: 300,
            error_backoff_ms: 1000,
            use_cors: true,
            allow_taint: false,
            scale: 2.0,
            background: "#FFFFFF".into(),
            reveal_nested: true,
        }
    }
}

impl Capture {
    /// Settle delay before attempt `attempt` (0-based).
    pub fn settle_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.settle_base_ms + self.settle_step_ms * u64::from(attempt))
    }

    /// Extra delay after the rasterizer raised on attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.error_backoff_ms * (u64::from(attempt) + 1))
    }

    pub fn background_rgb(&self) -> Result<Rgb<u8>> {
        parse_hex_color(&self.background)
    }
}

fn parse_hex_color(s: &str) -> Result<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("capture.background is not a #RRGGBB color: {s}"));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub page_width_mm: f32,
    pub placeholder_height_mm: f32,
    pub jpeg_quality: u8,
    pub title_max_chars: usize,
    pub default_file_name: String,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            placeholder_height_mm: 297.0,
            jpeg_quality: 95,
            title_max_chars: 50,
            default_file_name: "document.pdf".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    pub title: String,
    pub render_latency_ms: u64,
    pub window: usize,
    /// How long `locate` waits for the page directory to appear.
    pub locate_timeout_ms: u64,
}
impl Default for Replay {
    fn default() -> Self {
        Self {
            title: "".into(),
            render_latency_ms: 400,
            window: 2,
            locate_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
