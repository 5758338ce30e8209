//! Per-request agent loop state machine.
//!
//! ```text
//! Started → AwaitingModel → InterpretingOutput ─┬→ ExecutingTools ─→ AwaitingModel
//!                                               └→ Finishing ─→ Done
//! ```
//!
//! One [`AgentLoopState`] exists per client request. It is transient: once
//! the response is emitted the state is discarded. Session history is
//! owned elsewhere.

use serde::{Deserialize, Serialize};

/// Phase of the agent loop for one client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Started,
    AwaitingModel,
    InterpretingOutput,
    ExecutingTools,
    Finishing,
    Done,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The model produced a turn without tool calls.
    Completed,
    /// The configured maximum number of tool turns was reached.
    TurnLimitExceeded,
    /// The backend model collaborator failed.
    BackendError,
    /// The client disconnected or the request was cancelled.
    Cancelled,
}

/// Transient per-request loop state.
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    phase: LoopPhase,
    turn: u32,
    max_turns: u32,
    termination: Option<TerminationReason>,
}

impl AgentLoopState {
    pub fn new(max_turns: u32) -> Self {
        Self {
            phase: LoopPhase::Started,
            turn: 0,
            max_turns,
            termination: None,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Enter the model-call phase. Valid from `Started`, `ExecutingTools`
    /// (next round-trip), or `InterpretingOutput` re-entry after results.
    pub fn await_model(&mut self) {
        debug_assert!(matches!(
            self.phase,
            LoopPhase::Started | LoopPhase::ExecutingTools
        ));
        self.phase = LoopPhase::AwaitingModel;
    }

    /// A full model turn has arrived.
    pub fn interpret_output(&mut self) {
        debug_assert_eq!(self.phase, LoopPhase::AwaitingModel);
        self.phase = LoopPhase::InterpretingOutput;
    }

    /// The turn contained tool calls; count it and enter execution.
    /// Returns `false` once the limit is exhausted (after exactly
    /// `max_turns` tool turns) — the caller must transition to finishing
    /// with [`TerminationReason::TurnLimitExceeded`].
    pub fn begin_tool_turn(&mut self) -> bool {
        debug_assert_eq!(self.phase, LoopPhase::InterpretingOutput);
        self.turn += 1;
        if self.turn > self.max_turns {
            return false;
        }
        self.phase = LoopPhase::ExecutingTools;
        true
    }

    /// Enter the terminal emit phase with the given reason.
    pub fn finish(&mut self, reason: TerminationReason) {
        self.phase = LoopPhase::Finishing;
        self.termination = Some(reason);
    }

    /// The response has been handed off; the state is now inert.
    pub fn done(&mut self) {
        debug_assert_eq!(self.phase, LoopPhase::Finishing);
        self.phase = LoopPhase::Done;
    }

    pub fn is_done(&self) -> bool {
        self.phase == LoopPhase::Done
    }
}
