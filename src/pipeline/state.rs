use std::fmt;

use crate::foundation::error::{TalkreelError, TalkreelResult};

/// Why a run ended in [`PipelineState::Failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoCredit,
    EmptyInput,
    Backend,
    Synthesis,
    Render,
    /// The transport rejected the finished reply.
    Delivery,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoCredit => "no_credit",
            Self::EmptyInput => "empty_input",
            Self::Backend => "backend",
            Self::Synthesis => "synthesis",
            Self::Render => "render",
            Self::Delivery => "delivery",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Completing,
    Synthesizing,
    Rendering,
    Delivered,
    Failed(FailureReason),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed(_))
    }

    /// Forward transition, or failure from any non-terminal state.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Received, Completing)
            | (Completing, Synthesizing)
            | (Synthesizing, Rendering)
            | (Rendering, Delivered) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Failure reason for an error raised while in this state.
    pub fn failure_for(self, err: &TalkreelError) -> FailureReason {
        match err {
            TalkreelError::InsufficientCredit => FailureReason::NoCredit,
            TalkreelError::EmptyInput => FailureReason::EmptyInput,
            TalkreelError::Delivery(_) => FailureReason::Delivery,
            _ => match self {
                Self::Received => FailureReason::EmptyInput,
                Self::Completing => FailureReason::Backend,
                Self::Synthesizing => FailureReason::Synthesis,
                Self::Rendering | Self::Delivered | Self::Failed(_) => FailureReason::Render,
            },
        }
    }
}

/// Ordered record of the states one run visited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl Default for StateTrace {
    fn default() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }
}

impl StateTrace {
    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn advance(&mut self, next: PipelineState) -> TalkreelResult<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(TalkreelError::validation(format!(
                "illegal pipeline transition {current:?} -> {next:?}"
            )));
        }
        self.states.push(next);
        Ok(())
    }
}
