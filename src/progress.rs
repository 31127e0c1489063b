//! Progress sinks. The pipeline pushes `(message, percent)` events and never
//! reads anything back.

use std::io::Write;
use std::sync::Mutex;
use tracing::info;

pub trait ProgressReporter {
    fn report(&self, message: &str, percent: u8);
}

impl<F> ProgressReporter for F
where
    F: Fn(&str, u8),
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Emits progress as log events.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, message: &str, percent: u8) {
        info!(percent = percent.min(100), "{message}");
    }
}

/// A percent bar plus status line on stderr.
#[derive(Debug)]
pub struct ConsoleProgress {
    width: usize,
    last_len: Mutex<usize>,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ConsoleProgress {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            last_len: Mutex::new(0),
        }
    }

    /// Ends the status line so later output starts on a fresh line.
    pub fn finish(&self) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err);
    }
}

pub fn render_bar(width: usize, percent: u8) -> String {
    let percent = usize::from(percent.min(100));
    let filled = width * percent / 100;
    format!("[{}{}] {:>3}%", "#".repeat(filled), ".".repeat(width - filled), percent)
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, message: &str, percent: u8) {
        let line = format!("{} {}", render_bar(self.width, percent), message);
        let mut last = self.last_len.lock().unwrap_or_else(|e| e.into_inner());
        let pad = last.saturating_sub(line.chars().count());
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{line}{}", " ".repeat(pad));
        let _ = err.flush();
        *last = line.chars().count();
    }
}
