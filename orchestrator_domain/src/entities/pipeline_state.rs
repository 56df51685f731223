//! # Pipeline State Machine
//!
//! Per-worker lifecycle: `INITIALISING → RUNNING ⇄ MUTED → TERMINATING →
//! TERMINATED`. `RUNNING` also has a transient substate `DRAINING`, set
//! once every source has reached `ENDED`/`ERROR`, which triggers an async
//! termination task. `TERMINATED` is absorbing — no transition leaves it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineState {
    Initialising,
    Running,
    /// Transient: `Running` with all sources terminal, about to transition
    /// to `Terminating` via an async task.
    Draining,
    Muted,
    Terminating,
    Terminated,
}

impl PipelineState {
    /// Whether `to` is a legal transition from `self`.
    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        use PipelineState::*;
        match (self, to) {
            (Initialising, Running) => true,
            (Running, Muted) => true,
            (Running, Draining) => true,
            (Running, Terminating) => true,
            (Draining, Terminating) => true,
            (Muted, Running) => true,
            (Muted, Terminating) => true,
            (Terminating, Terminated) => true,
            _ => false,
        }
    }

    /// `Terminated` accepts no further transitions.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, PipelineState::Terminated)
    }

    /// Whether commands other than `TERMINATE`/`STATUS` should be rejected.
    pub fn accepts_commands(&self) -> bool {
        matches!(self, PipelineState::Running | PipelineState::Muted)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialising => "INITIALISING",
            Self::Running => "RUNNING",
            Self::Draining => "DRAINING",
            Self::Muted => "MUTED",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
        };
        write!(f, "{s}")
    }
}

/// A validated transition request; returns an error describing the
/// illegal edge rather than panicking, since transitions are driven by
/// untrusted wire commands and health-check outcomes.
pub fn transition(from: PipelineState, to: PipelineState) -> Result<PipelineState, String> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(format!("illegal pipeline state transition: {from} -> {to}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_legal_transitions() {
        assert!(Initialising.can_transition_to(Running));
        assert!(Running.can_transition_to(Muted));
        assert!(Muted.can_transition_to(Running));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Initialising.can_transition_to(Terminated));
        assert!(!Muted.can_transition_to(Draining));
    }

    #[test]
    fn test_terminated_is_absorbing() {
        assert!(Terminated.is_absorbing());
        assert!(!Running.is_absorbing());
    }

    #[test]
    fn test_transition_helper_reports_illegal_edge() {
        let result = transition(Terminated, Running);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("TERMINATED -> RUNNING"));
    }

    #[test]
    fn test_accepts_commands() {
        assert!(Running.accepts_commands());
        assert!(Muted.accepts_commands());
        assert!(!Terminating.accepts_commands());
        assert!(!Initialising.accepts_commands());
    }
}
