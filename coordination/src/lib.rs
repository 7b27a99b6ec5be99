//! Mission coordination library
//!
//! This library provides the deterministic core of persona-driven cognitive
//! usability missions:
//! - Mission state machine with guarded transitions and resumable checkpoints
//! - Frustration-driven escalation engine gating human-in-the-loop pauses
//! - Cross-platform lesson correlation over a similarity-addressed memory
//!
//! # Flow
//!
//! ```text
//! LoadPersona → PlanMission → RetrieveMemory → ScoutPage → MapSchema → AuditUX
//!     → GenerateScript → ExecuteAction → CheckEscalation ─┬─▶ GenerateScript (retry / next step)
//!                                                         ├─▶ AwaitHuman ─▶ (resume) LearnLesson
//!                                                         └─▶ GenerateReport → Done
//! ```
//!
//! Every external capability (persona lookup, page scouting, text generation,
//! UI automation, vector memory, checkpoint storage) is reached through a
//! trait in [`mission::collaborators`], [`memory`] or [`mission::checkpoint`].
//! Concrete adapters live in the `mission-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod error;
pub mod escalation;
pub mod memory;
pub mod mission;
pub mod model;

// Re-export error types
pub use error::{MissionError, MissionErrorKind, MissionResult};

// Re-export escalation types
pub use escalation::{
    EscalationConfig, EscalationDecision, EscalationEngine, EscalationReason, FrustrationEvent,
    FrustrationKind, HitlContext,
};

// Re-export memory types
pub use memory::{
    CrossPlatformCorrelator, InMemoryLessonStore, LessonMatch, MemoryError, MemoryService,
};

// Re-export mission types
pub use mission::{
    CheckpointStore, Collaborators, MachineConfig, MissionMachine, MissionReport, MissionState,
    RunContext, RunOutcome,
};

// Re-export data model
pub use model::{
    ActionAttempt, ActionKind, FrictionPoint, FrictionSeverity, LessonEntry, Mission,
    PersonaProfile, Platform, Step, UiSchema,
};
