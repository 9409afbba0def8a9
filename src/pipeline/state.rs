//! Run state of a stream

use std::time::Instant;

/// Executor state machine
///
/// A stream runs once: `Idle → Running → Stopping` and then one of the two
/// terminal states. `Completed` means the run ended on cancellation,
/// `Failed` means a stage returned an unrecoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Chain built, tick loop not started
    Idle,

    /// Tick loop is active
    Running {
        /// When the tick loop started
        started_at: Instant,
    },

    /// Tick loop left, stages being finalized
    Stopping,

    /// Ended on cancellation
    Completed,

    /// Ended on a non-retry stage error
    Failed,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, Running { .. }) => true,
            // cancelled before the first tick
            (Idle, Stopping) => true,

            (Running { .. }, Stopping) => true,

            (Stopping, Completed) => true,
            (Stopping, Failed) => true,

            (Completed, _) | (Failed, _) => false,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running { .. } => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Completed => "Completed",
            PipelineState::Failed => "Failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    /// Check if the run reached one of the terminal states
    pub fn is_terminated(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
