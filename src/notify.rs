use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// End-of-job user notification channel.
pub trait Notifier {
    fn notify(&self, level: NoticeLevel, title: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, title: &str, text: &str) -> Result<()> {
        match level {
            NoticeLevel::Info => info!(target: "pagecap::notice", "{title}: {text}"),
            NoticeLevel::Error => error!(target: "pagecap::notice", "{title}: {text}"),
        }
        Ok(())
    }
}

/// Notification failures never change a job's outcome; they are logged.
pub fn notify_quietly(notifier: &dyn Notifier, level: NoticeLevel, title: &str, text: &str) {
    if let Err(err) = notifier.notify(level, title, text) {
        warn!("notification failed: {err:#}");
    }
}

pub fn completion_text(captured: usize, total: usize) -> String {
    format!("document saved: {captured}/{total} pages captured")
}
