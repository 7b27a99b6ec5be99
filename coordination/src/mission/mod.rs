//! Mission orchestration: the state machine and everything it threads.
//!
//! # Modules
//!
//! - [`state`]: Mission states, legal transitions, transition log
//! - [`context`]: RunContext, incidents and run notes
//! - [`collaborators`]: Persona, scout, mapper, dispatcher, driver and screenshot seams
//! - [`parse`]: Typed parsers for dispatcher output
//! - [`tasks`]: Task builders for the planning, audit and script roles
//! - [`machine`]: MissionMachine: run, step, resume, status
//! - [`checkpoint`]: Versioned checkpoints, integrity validation, stores
//! - [`report`]: Final report aggregation and Markdown rendering

pub mod checkpoint;
pub mod collaborators;
pub mod context;
pub mod machine;
pub mod parse;
pub mod report;
pub mod state;
pub mod tasks;

pub use checkpoint::{
    validate_context, CheckpointError, CheckpointStore, FileCheckpointStore,
    InMemoryCheckpointStore, IntegrityStatus, RunCheckpoint,
};
pub use collaborators::{
    ActionOutcome, ActionRequest, AgentDispatcher, AgentRole, AgentTask, AutomationDriver,
    DefaultPersonaSource, DispatchError, DriverError, PageScout, PersonaSource, SchemaMapper,
    ScoutError, ScreenshotSink,
};
pub use context::{Incident, RunContext, RunNote};
pub use machine::{
    branch_policy, Collaborators, MachineConfig, MissionMachine, RunOutcome, HITL_FRICTION_TYPE,
};
pub use parse::{ActionScript, AuditFindings, MissionPlan, ParseError};
pub use report::{CrossPlatformInsight, MissionReport};
pub use state::{IllegalTransition, MissionState, StateTrack, TransitionRecord};
