use crate::{
    capture::{OutcomeKind, PageReport},
    preload::PreloadSummary,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub captured: usize,
    pub total: usize,
}

impl Tally {
    pub fn from_pages(pages: &[PageReport]) -> Self {
        Self {
            captured: pages
                .iter()
                .filter(|p| p.outcome == OutcomeKind::Captured)
                .count(),
            total: pages.len(),
        }
    }

    /// Completion alone does not mean every page made it.
    pub fn is_complete(&self) -> bool {
        self.captured == self.total
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.captured, self.total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_name: String,
    pub started: String,
    pub finished: String,
    pub title: Option<String>,
    pub file_name: String,
    pub tally: Tally,
    pub preload: PreloadSummary,
    pub pages: Vec<PageReport>,
}
