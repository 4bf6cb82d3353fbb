// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pipeline state machine with typed state transitions.
//!
//! Implements the run lifecycle: Starting → Streaming → Draining → Done,
//! with Failed reachable from every non-terminal state.
//! Invalid transitions result in StateTransitionError.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Pipeline lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Provisioning the sink and launching the benchmark.
    Starting,

    /// Pulling chunks, framing records, writing metrics.
    Streaming,

    /// End of stream or cancellation: flushing the sink, reaping the process.
    Draining,

    /// Clean stop.
    Done,

    /// Fatal error.
    Failed,
}

impl PipelineState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Streaming => "Streaming",
            Self::Draining => "Draining",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        matches!(
            (self, target),
            (Self::Starting, Self::Streaming)
                | (Self::Streaming, Self::Draining)
                | (Self::Draining, Self::Done)
                | (Self::Starting, Self::Failed)
                | (Self::Streaming, Self::Failed)
                | (Self::Draining, Self::Failed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one pipeline run.
/// Enforces valid state transitions and records the path taken.
#[derive(Debug)]
pub struct PipelineStateMachine {
    current_state: PipelineState,
    started: Instant,
    last_transition: Instant,
    history: Vec<PipelineState>,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            current_state: PipelineState::Starting,
            started: now,
            last_transition: now,
            history: vec![PipelineState::Starting],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.current_state
    }

    /// Every state visited, in order, starting with `Starting`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: PipelineState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current_state.name(),
            to = target.name(),
            elapsed_ms = self.last_transition.elapsed().as_millis() as u64,
            "Pipeline state transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.history.push(target);

        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.current_state.is_terminal() {
            // Every non-terminal state may fail.
            let _ = self.transition_to(PipelineState::Failed);
        }
    }
}

impl Default for PipelineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
