//! External collaborator contracts consumed by the mission state machine.
//!
//! Each trait is a narrow request/response seam. Concrete implementations
//! (HTTP dispatcher, command driver, registry files) live in the agents
//! crate; tests substitute scripted mocks.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{ActionKind, PageSnapshot, PersonaProfile, Platform, UiSchema};

// ============================================================================
// Persona Source
// ============================================================================

/// Persona lookup by identifier.
#[async_trait]
pub trait PersonaSource: Send + Sync {
    /// `None` when the identifier is unknown.
    async fn load(&self, persona_id: &str) -> Option<PersonaProfile>;
}

// ============================================================================
// Page Scout and Schema Mapper
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoutError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("target returned HTTP {0}")]
    Status(u16),
    #[error("cannot scout {platform} target '{target}'")]
    Unsupported { platform: Platform, target: String },
}

/// Fetches rendered content for a target.
#[async_trait]
pub trait PageScout: Send + Sync {
    async fn scout(&self, target: &str, platform: Platform) -> Result<PageSnapshot, ScoutError>;
}

/// Extracts an interactive-element schema. Never fails: absent content
/// yields an empty schema.
pub trait SchemaMapper: Send + Sync {
    fn map(&self, page: &PageSnapshot) -> UiSchema;
}

// ============================================================================
// Agent Task Dispatcher
// ============================================================================

/// Which generation role a task is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Breaks an objective into atomic steps.
    Planner,
    /// Audits page content for friction.
    Auditor,
    /// Turns a step into a concrete driver action.
    ScriptWriter,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planner => write!(f, "planner"),
            Self::Auditor => write!(f, "auditor"),
            Self::ScriptWriter => write!(f, "script_writer"),
        }
    }
}

/// A structured prompt for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub role: AgentRole,
    /// Free-text task description. Implementations bound its size.
    pub description: String,
    /// Persona and context bundle.
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher transport failed: {0}")]
    Transport(String),
    #[error("dispatcher returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("dispatcher returned no content")]
    Empty,
}

/// Returns free text expected to contain a single JSON object.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(&self, task: &AgentTask) -> Result<String, DispatchError>;
}

// ============================================================================
// Automation Driver
// ============================================================================

/// Action handed to the automation driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub platform: Platform,
    /// Semantic target description; the driver resolves it.
    pub target: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    pub timeout_ms: u64,
}

/// Result of a completed driver call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Raw screenshot bytes, if the driver captured one.
    pub screenshot: Option<Vec<u8>>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            screenshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The call exceeded its timeout.
    #[error("action timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout { timeout_ms: u64, elapsed_ms: u64 },
    /// The driver itself broke (could not start, bad protocol, crashed).
    #[error("driver fault: {0}")]
    Fault(String),
}

/// Executes one resolved action against a live UI.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, DriverError>;
}

// ============================================================================
// Screenshot Sink
// ============================================================================

/// Persists screenshots and returns a reference stored on the attempt.
#[async_trait]
pub trait ScreenshotSink: Send + Sync {
    async fn store(&self, run_id: &str, attempt: usize, png: &[u8]) -> std::io::Result<String>;
}

/// Persona source that knows only the built-in default persona.
#[derive(Debug, Clone, Default)]
pub struct DefaultPersonaSource;

#[async_trait]
impl PersonaSource for DefaultPersonaSource {
    async fn load(&self, persona_id: &str) -> Option<PersonaProfile> {
        (persona_id == PersonaProfile::DEFAULT_ID).then(PersonaProfile::senior_casual)
    }
}
