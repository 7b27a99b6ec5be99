//! Mission states and the legal transition table.
//!
//! `StateTrack` owns the current state and an append-only transition log.
//! `advance()` rejects any edge missing from the table below, and the log is
//! checkpointed with the run so a resumed mission carries its full path.
//!
//! ```text
//! LoadPersona → PlanMission → RetrieveMemory → ScoutPage → MapSchema → AuditUx
//!     → GenerateScript → ExecuteAction → CheckEscalation
//! CheckEscalation → AwaitHuman | GenerateScript | GenerateReport
//! AwaitHuman → LearnLesson → GenerateScript | GenerateReport
//! GenerateReport → Done
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The set of mission states.
///
/// Every run starts at `LoadPersona` and terminates at `Done`. `AwaitHuman`
/// is a resting state: the run is checkpointed and control returns to the
/// caller until feedback arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    LoadPersona,
    PlanMission,
    RetrieveMemory,
    ScoutPage,
    MapSchema,
    AuditUx,
    GenerateScript,
    ExecuteAction,
    CheckEscalation,
    AwaitHuman,
    LearnLesson,
    GenerateReport,
    Done,
}

impl MissionState {
    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    /// Whether the driver loop must yield control here.
    pub fn is_suspension_point(self) -> bool {
        self == Self::AwaitHuman
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LoadPersona => "LoadPersona",
            Self::PlanMission => "PlanMission",
            Self::RetrieveMemory => "RetrieveMemory",
            Self::ScoutPage => "ScoutPage",
            Self::MapSchema => "MapSchema",
            Self::AuditUx => "AuditUX",
            Self::GenerateScript => "GenerateScript",
            Self::ExecuteAction => "ExecuteAction",
            Self::CheckEscalation => "CheckEscalation",
            Self::AwaitHuman => "AwaitHuman",
            Self::LearnLesson => "LearnLesson",
            Self::GenerateReport => "GenerateReport",
            Self::Done => "Done",
        };
        f.write_str(s)
    }
}

/// Legal transitions between mission states.
fn is_legal_transition(from: MissionState, to: MissionState) -> bool {
    use MissionState::*;

    matches!(
        (from, to),
        (LoadPersona, PlanMission)
            | (PlanMission, RetrieveMemory)
            | (RetrieveMemory, ScoutPage)
            | (ScoutPage, MapSchema)
            | (MapSchema, AuditUx)
            | (AuditUx, GenerateScript)
            | (GenerateScript, ExecuteAction)
            | (ExecuteAction, CheckEscalation)
            // Branch policy: pause, retry/advance, or finish
            | (CheckEscalation, AwaitHuman)
            | (CheckEscalation, GenerateScript)
            | (CheckEscalation, GenerateReport)
            // Resumption only ever enters at LearnLesson
            | (AwaitHuman, LearnLesson)
            | (LearnLesson, GenerateScript)
            | (LearnLesson, GenerateReport)
            | (GenerateReport, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: MissionState,
    pub to: MissionState,
    pub at: DateTime<Utc>,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: MissionState,
    pub to: MissionState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Current state plus the full transition log. Serialised with the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTrack {
    current: MissionState,
    transitions: Vec<TransitionRecord>,
}

impl Default for StateTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTrack {
    /// Start at `LoadPersona`.
    pub fn new() -> Self {
        Self {
            current: MissionState::LoadPersona,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> MissionState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: MissionState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// How many times the run has entered `state`.
    pub fn visits(&self, state: MissionState) -> usize {
        self.transitions.iter().filter(|t| t.to == state).count()
    }

    /// The last transition's target agrees with the current state.
    pub fn is_consistent(&self) -> bool {
        self.transitions
            .last()
            .map_or(self.current == MissionState::LoadPersona, |t| t.to == self.current)
    }

    /// Get a summary string of the run's path.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let path = if states.is_empty() {
            String::new()
        } else {
            format!(" [{}]", states.join(" → "))
        };
        format!(
            "{} → {} ({} transitions){}",
            MissionState::LoadPersona,
            self.current,
            self.transitions.len(),
            path
        )
    }
}
