//! Mission error taxonomy.
//!
//! Most failures are recoverable: the state machine converts them into an
//! [`Incident`](crate::mission::Incident) on the run context and routes them
//! through the escalation policy. Only the fatal variants are ever returned
//! to a caller, and only from `resume`/`status` on a bad checkpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mission::checkpoint::CheckpointError;
use crate::mission::state::IllegalTransition;

/// Result type alias for mission operations
pub type MissionResult<T> = Result<T, MissionError>;

/// High-level error kind, recorded on incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionErrorKind {
    PersonaNotFound,
    PlanParseFailure,
    AuditParseFailure,
    ScoutFailure,
    ActionFailure,
    ExecutionFault,
    EscalationDeadlock,
    MemoryServiceFailure,
    InvalidContext,
    Checkpoint,
    IllegalTransition,
    NotAwaitingFeedback,
}

impl MissionErrorKind {
    /// Whether the run continues after this failure.
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            Self::InvalidContext | Self::Checkpoint | Self::IllegalTransition | Self::NotAwaitingFeedback
        )
    }

    /// How the run recovers (or what the caller should do).
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::PersonaNotFound => "continue with the default persona",
            Self::PlanParseFailure => "continue with the objective as a single step",
            Self::AuditParseFailure => "continue with a neutral audit",
            Self::ScoutFailure => "continue with empty page context",
            Self::ActionFailure => "retry the step; escalation policy decides when to stop",
            Self::ExecutionFault => "regenerate the script; counts as a failed attempt",
            Self::EscalationDeadlock => "supply human feedback for this run id",
            Self::MemoryServiceFailure => "continue without lessons",
            Self::InvalidContext => "discard the checkpoint and start a new run",
            Self::Checkpoint => "check checkpoint storage and retry",
            Self::IllegalTransition => "report a state machine bug",
            Self::NotAwaitingFeedback => "only runs paused for a human accept feedback",
        }
    }
}

impl std::fmt::Display for MissionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PersonaNotFound => "persona_not_found",
            Self::PlanParseFailure => "plan_parse_failure",
            Self::AuditParseFailure => "audit_parse_failure",
            Self::ScoutFailure => "scout_failure",
            Self::ActionFailure => "action_failure",
            Self::ExecutionFault => "execution_fault",
            Self::EscalationDeadlock => "escalation_deadlock",
            Self::MemoryServiceFailure => "memory_service_failure",
            Self::InvalidContext => "invalid_context",
            Self::Checkpoint => "checkpoint",
            Self::IllegalTransition => "illegal_transition",
            Self::NotAwaitingFeedback => "not_awaiting_feedback",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during mission operations
#[derive(Error, Debug)]
pub enum MissionError {
    #[error("persona '{persona_id}' not found")]
    PersonaNotFound { persona_id: String },

    #[error("mission plan unparseable: {reason}")]
    PlanParseFailure { reason: String },

    #[error("audit output unparseable: {reason}")]
    AuditParseFailure { reason: String },

    #[error("page scout failed: {reason}")]
    ScoutFailure { reason: String },

    #[error("action failed: {reason}")]
    ActionFailure { reason: String },

    #[error("execution fault: {reason}")]
    ExecutionFault { reason: String },

    #[error("run {run_id} is waiting for human feedback")]
    EscalationDeadlock { run_id: String },

    #[error("memory service failed: {reason}")]
    MemoryServiceFailure { reason: String },

    /// Structurally invalid run context. Fatal to a resume attempt.
    #[error("invalid run context: {reason}")]
    InvalidContext { reason: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("run {run_id} is in state {state}, not awaiting feedback")]
    NotAwaitingFeedback { run_id: String, state: String },
}

impl MissionError {
    pub fn kind(&self) -> MissionErrorKind {
        match self {
            Self::PersonaNotFound { .. } => MissionErrorKind::PersonaNotFound,
            Self::PlanParseFailure { .. } => MissionErrorKind::PlanParseFailure,
            Self::AuditParseFailure { .. } => MissionErrorKind::AuditParseFailure,
            Self::ScoutFailure { .. } => MissionErrorKind::ScoutFailure,
            Self::ActionFailure { .. } => MissionErrorKind::ActionFailure,
            Self::ExecutionFault { .. } => MissionErrorKind::ExecutionFault,
            Self::EscalationDeadlock { .. } => MissionErrorKind::EscalationDeadlock,
            Self::MemoryServiceFailure { .. } => MissionErrorKind::MemoryServiceFailure,
            Self::InvalidContext { .. } => MissionErrorKind::InvalidContext,
            Self::Checkpoint(_) => MissionErrorKind::Checkpoint,
            Self::IllegalTransition(_) => MissionErrorKind::IllegalTransition,
            Self::NotAwaitingFeedback { .. } => MissionErrorKind::NotAwaitingFeedback,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}
