//! Caller-supplied time budget.
//!
//! Stages cannot be interrupted mid-computation, so the pipeline checks
//! the deadline at stage boundaries (and the denoiser once per search
//! offset). Running out of time yields [`PipelineError::Timeout`] and
//! discards everything computed so far.

use std::time::{Duration, Instant};

use crate::types::PipelineError;

/// A point in time after which work must stop.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    #[must_use]
    pub const fn none() -> Self {
        Self { at: None }
    }

    /// A deadline `budget` from now.
    ///
    /// A budget too large to represent is treated as no deadline.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// A deadline `budget` from now, or none when `budget` is `None`.
    #[must_use]
    pub fn from_budget(budget: Option<Duration>) -> Self {
        budget.map_or_else(Self::none, Self::after)
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`PipelineError::Timeout`] if the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Timeout`] naming `stage`.
    pub fn check(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.expired() {
            tracing::warn!(stage, "time budget exhausted");
            return Err(PipelineError::Timeout { stage });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.expired());
        assert!(deadline.check("decode").is_ok());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert!(matches!(
            deadline.check("denoise"),
            Err(PipelineError::Timeout { stage: "denoise" })
        ));
    }

    #[test]
    fn generous_budget_does_not_expire() {
        let deadline = Deadline::from_budget(Some(Duration::from_secs(3600)));
        assert!(!deadline.expired());
    }

    #[test]
    fn unrepresentable_budget_is_unbounded() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.expired());
    }
}
