//! Mission data model: the values threaded through a mission run.
//!
//! Everything here is plain data: serialisable, cloneable, and free of I/O.
//! [`RunContext`](crate::mission::RunContext) aggregates these types into the
//! single mutable object that every state transition receives.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution context a mission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Web,
    Mobile,
}

impl Platform {
    /// The other execution context (web ↔ mobile).
    pub fn opposite(self) -> Self {
        match self {
            Self::Web => Self::Mobile,
            Self::Mobile => Self::Web,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("unknown platform '{other}' (expected web or mobile)")),
        }
    }
}

/// A single objective tested against a target for one persona.
///
/// Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    /// Natural-language objective, e.g. "fill out the contact form".
    pub objective: String,
    /// URL (web) or activity/app identifier (mobile).
    pub target: String,
    pub platform: Platform,
    /// Persona identifier resolved against the persona source.
    pub persona_id: String,
}

impl Mission {
    pub fn new(
        objective: impl Into<String>,
        target: impl Into<String>,
        platform: Platform,
        persona_id: impl Into<String>,
    ) -> Self {
        Self {
            objective: objective.into(),
            target: target.into(),
            platform,
            persona_id: persona_id.into(),
        }
    }
}

/// Simulated user profile that shapes planning and audit weighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub age: u32,
    pub tech_literacy: String,
    pub eyesight: String,
    pub cognitive_load: String,
    pub preferred_navigation: String,
    pub reading_level: String,
    /// Ordered rules describing where this persona's attention goes.
    #[serde(default)]
    pub attention_rules: Vec<String>,
}

impl PersonaProfile {
    /// Identifier of the documented fallback persona.
    pub const DEFAULT_ID: &'static str = "senior_casual";

    /// The documented fallback persona used when a lookup misses.
    pub fn senior_casual() -> Self {
        Self {
            age: 68,
            tech_literacy: "low".into(),
            eyesight: "reduced (needs large text and high contrast)".into(),
            cognitive_load: "low tolerance".into(),
            preferred_navigation: "linear, visible menus".into(),
            reading_level: "plain language".into(),
            attention_rules: vec![
                "Reads top to bottom and left to right".into(),
                "Ignores content that looks like an advertisement".into(),
                "Gives up after two unexplained errors".into(),
            ],
        }
    }
}

/// One atomic planned action produced by the planning collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// What to do, in planner words.
    pub action: String,
    /// What to interact with.
    #[serde(default)]
    pub target: String,
    /// How success is verified.
    #[serde(default)]
    pub validation: String,
    #[serde(default)]
    pub cognitive_notes: String,
}

impl Step {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: String::new(),
            validation: String::new(),
            cognitive_notes: String::new(),
        }
    }

    /// Text handed to the driver and recorded on attempts.
    pub fn describe(&self) -> String {
        if self.target.is_empty() {
            self.action.clone()
        } else {
            format!("{} ({})", self.action, self.target)
        }
    }
}

/// Concrete action kinds the automation driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    Screenshot,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Type => "type",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "click" | "tap" => Ok(Self::Click),
            "type" | "fill" | "input" => Ok(Self::Type),
            "scroll" => Ok(Self::Scroll),
            "wait" => Ok(Self::Wait),
            "screenshot" => Ok(Self::Screenshot),
            other => Err(format!("unknown action kind '{other}'")),
        }
    }
}

/// One execution of a generated script. Append-only per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAttempt {
    pub timestamp: DateTime<Utc>,
    /// Driver action kind, or `execution_fault` when no script could run.
    pub action_type: String,
    /// Target/selector text the attempt addressed.
    pub target: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

/// Severity of an audited friction point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FrictionSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for FrictionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrictionSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A usability defect found by the audit collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrictionPoint {
    pub element: String,
    /// Issue category: visibility, cognitive_load, interaction, accessibility, …
    pub issue_type: String,
    pub severity: FrictionSeverity,
    pub persona_impact: String,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

/// A lesson written once per human intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonEntry {
    pub lesson_text: String,
    pub url: String,
    pub platform: Platform,
    pub friction_type: String,
    pub resolution: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Rendered page content returned by the page scout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Markdown/plain-text rendering used as planning and audit context.
    pub markdown: String,
    /// Raw HTML, when the scout has it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// One interactive element found by the schema mapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Interactive-element schema of the scouted page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSchema {
    #[serde(default)]
    pub interactive_elements: Vec<InteractiveElement>,
    /// Link texts found inside navigation landmarks.
    #[serde(default)]
    pub navigation: Vec<String>,
    #[serde(default)]
    pub headings: Vec<String>,
}

impl UiSchema {
    pub fn is_empty(&self) -> bool {
        self.interactive_elements.is_empty() && self.navigation.is_empty() && self.headings.is_empty()
    }
}
