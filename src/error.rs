use thiserror::Error;

/// Structural precondition failures. These abort a job before any unit is
/// processed; nothing about them is retryable.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("rendering surface not found: {0}")]
    SurfaceNotFound(String),

    #[error("no pages found in the viewer")]
    NoUnits,
}
