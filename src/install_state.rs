//! Install State Machine
//!
//! Tracks which step of a component install is running. Transitions only move
//! forward one stage at a time; any non-terminal stage may move to `Failed`.
//! There is no rollback state: undoing a failed install is a separate,
//! explicit uninstall.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! PreInstalling
//!     ↓
//! PackagesInstalling
//!     ↓
//! DirsRecording
//!     ↓
//! PostInstalling
//!     ↓
//! Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;

use thiserror::Error;

/// Install stages in sequential order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,

    /// Running package-specific pre-install commands
    PreInstalling = 1,

    /// Batch-installing packages and tracing each one
    PackagesInstalling = 2,

    /// Creating the working area and tracing created directories
    DirsRecording = 3,

    /// Type-specific fixups (grants, bind address)
    PostInstalling = 4,

    /// Terminal: install finished
    Done = 5,

    /// Terminal: a step failed
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Next stage in the sequence, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::PreInstalling),
            Self::PreInstalling => Some(Self::PackagesInstalling),
            Self::PackagesInstalling => Some(Self::DirsRecording),
            Self::DirsRecording => Some(Self::PostInstalling),
            Self::PostInstalling => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::PreInstalling => "Running pre-install commands",
            Self::PackagesInstalling => "Installing packages",
            Self::DirsRecording => "Recording directories",
            Self::PostInstalling => "Running post-install fixups",
            Self::Done => "Install complete",
            Self::Failed => "Install failed",
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::PreInstalling,
            Self::PackagesInstalling,
            Self::DirsRecording,
            Self::PostInstalling,
            Self::Done,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to} (must transition through intermediate stages)")]
    SkippedStage { from: InstallStage, to: InstallStage },

    #[error("Cannot go backwards from {from} to {to} (install is forward-only)")]
    BackwardTransition { from: InstallStage, to: InstallStage },

    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

/// Owns the current stage of one install run and its history.
///
/// ```
/// use stackctl::install_state::{InstallerContext, InstallStage};
///
/// let mut ctx = InstallerContext::new();
/// ctx.transition_to(InstallStage::PreInstalling).unwrap();
/// assert_eq!(ctx.current_stage(), InstallStage::PreInstalling);
/// assert!(ctx.transition_to(InstallStage::PostInstalling).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct InstallerContext {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// (stage, unix seconds) for every transition taken
    stage_history: Vec<(InstallStage, u64)>,
}

impl Default for InstallerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallerContext {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == InstallStage::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Transition to `target`, which must be exactly the next stage
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }
        if target != InstallStage::Failed && target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.record(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the install failed at the current stage
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.record(InstallStage::Failed);
        self.current = InstallStage::Failed;
        Ok(())
    }

    fn record(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.stage_history.push((stage, timestamp));
    }
}

impl From<InstallTransitionError> for crate::error::StackError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::StackError::InstallTransition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_sequential() {
        for (i, stage) in InstallStage::all_stages().iter().enumerate() {
            assert_eq!(stage.order() as usize, i, "{stage:?}");
        }
    }

    #[test]
    fn test_stage_next_forms_chain() {
        let mut current = InstallStage::NotStarted;
        let mut count = 0;
        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }
        assert_eq!(current, InstallStage::Done);
        assert_eq!(count, 5);
    }

    fn step(ctx: &mut InstallerContext) {
        let next = ctx.current_stage().next().unwrap();
        ctx.transition_to(next).unwrap();
    }

    #[test]
    fn test_transition_through_all_stages() {
        let mut ctx = InstallerContext::new();
        while !ctx.current_stage().is_terminal() {
            step(&mut ctx);
        }
        assert!(ctx.is_done());
        assert_eq!(ctx.stage_history().len(), 5);
    }

    #[test]
    fn test_cannot_skip_stages() {
        let mut ctx = InstallerContext::new();
        let err = ctx.transition_to(InstallStage::DirsRecording).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut ctx = InstallerContext::new();
        step(&mut ctx);
        step(&mut ctx);
        let err = ctx.transition_to(InstallStage::PreInstalling).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));
    }

    #[test]
    fn test_cannot_transition_to_same_stage() {
        let mut ctx = InstallerContext::new();
        step(&mut ctx);
        let err = ctx.transition_to(InstallStage::PreInstalling).unwrap_err();
        assert!(matches!(err, InstallTransitionError::AlreadyAtStage { .. }));
    }

    #[test]
    fn test_fail_records_failed_at_stage() {
        let mut ctx = InstallerContext::new();
        step(&mut ctx);
        step(&mut ctx);
        ctx.fail().unwrap();
        assert!(ctx.is_failed());
        assert_eq!(ctx.failed_at(), Some(InstallStage::PackagesInstalling));
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut ctx = InstallerContext::new();
        ctx.fail().unwrap();
        assert!(matches!(
            ctx.transition_to(InstallStage::PreInstalling).unwrap_err(),
            InstallTransitionError::FromTerminalState { .. }
        ));
        assert!(ctx.fail().is_err());
    }

    #[test]
    fn test_error_display() {
        let err = InstallTransitionError::SkippedStage {
            from: InstallStage::NotStarted,
            to: InstallStage::Done,
        };
        let msg = err.to_string();
        assert!(msg.contains("Cannot skip"));
        assert!(msg.contains("Install complete"));
    }
}
